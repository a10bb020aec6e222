use std::net::SocketAddr;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, get_service, post},
    Extension, Json, Router,
};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    broadcast::Registry,
    config::Config,
    control::{ConnectReply, ConnectionsReply, ControlApi, DevicesReply, Platform},
    error::Error,
    websocket,
};

/// The ports the servers ended up listening on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedPorts {
    /// The HTTP server: API and static files.
    pub http: u16,

    /// The push server: websockets.
    pub push: u16,
}

/// Everything needed to serve: the registry of viewers and the control surface feeding it.
#[derive(Debug, Clone)]
pub struct Relay {
    config: Config,
    control: ControlApi,
}

impl Relay {
    /// Set up a relay.
    /// Errors if the configuration is not valid.
    pub fn new(config: Config, platform: Platform) -> Result<Self, Error> {
        config.validate()?;

        let control = ControlApi::new(Registry::new(), platform)
            .with_default_baud_rate(config.default_baud_rate)
            .with_delimiter(&config.delimiter);

        Ok(Self { config, control })
    }

    /// The registry of attached viewers.
    pub fn registry(&self) -> &Registry {
        self.control.registry()
    }

    /// The control surface.
    pub fn control(&self) -> &ControlApi {
        &self.control
    }

    /// Routes of the HTTP server.
    pub fn http_router(&self) -> Router {
        let static_files = get_service(ServeDir::new(&self.config.public_dir))
            .handle_error(handle_static_error);

        Router::new()
            .route("/api/devices", get(list_devices))
            .route("/api/connect", post(connect))
            .route("/api/connections", get(list_connections))
            .route("/config", get(show_config))
            .route("/version", get(show_version))
            .fallback(static_files)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    // Handlers reach the serial ports through the control surface
                    .layer(Extension(self.control.clone()))
                    .layer(Extension(self.config.clone())),
            )
    }

    /// Routes of the push server.
    /// A websocket upgrade is accepted on any path.
    pub fn push_router(&self) -> Router {
        Router::new()
            .route("/", get(websocket::ws_handler))
            .route("/*path", get(websocket::ws_handler))
            // Each websocket needs to be able to attach itself
            .layer(Extension(self.registry().clone()))
    }

    /// Run both servers on the ports given by the configuration.
    /// The ports allocated will be sent on the provided channel, if any.
    pub async fn serve(
        self,
        allocated_ports: Option<oneshot::Sender<AllocatedPorts>>,
    ) -> Result<(), Error> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let push_addr = SocketAddr::from(([0, 0, 0, 0], self.config.push_port));

        let http = axum::Server::try_bind(&http_addr)
            .map_err(|e| Error::Server(format!("Could not bind {http_addr}: {e}")))?
            .serve(self.http_router().into_make_service());

        let push = axum::Server::try_bind(&push_addr)
            .map_err(|e| Error::Server(format!("Could not bind {push_addr}: {e}")))?
            .serve(
                self.push_router()
                    .into_make_service_with_connect_info::<SocketAddr>(),
            );

        let ports = AllocatedPorts {
            http: http.local_addr().port(),
            push: push.local_addr().port(),
        };

        info!("HTTP server listening on {}", http.local_addr());
        info!("Push server listening on {}", push.local_addr());

        if let Some(port_reply) = allocated_ports {
            if port_reply.send(ports).is_err() {
                warn!("Nobody wanted to know which ports were allocated");
            }
        }

        tokio::try_join!(http, push).map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }
}

/// Start the servers on the ports of the configuration, using the serial ports of this host.
pub async fn run_on_ports(config: Config) -> Result<(), Error> {
    Relay::new(config, Platform::native())?.serve(None).await
}

async fn list_devices(Extension(control): Extension<ControlApi>) -> Json<DevicesReply> {
    Json(control.list_devices().await)
}

async fn connect(Extension(control): Extension<ControlApi>, body: Bytes) -> Json<ConnectReply> {
    Json(control.connect_json(&String::from_utf8_lossy(&body)).await)
}

async fn list_connections(Extension(control): Extension<ControlApi>) -> Json<ConnectionsReply> {
    Json(control.connections().await)
}

async fn handle_static_error(error: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Could not serve file: {error}"),
    )
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    config.serialize_pretty().map_err(|e| {
        warn!(%e, "Could not show config");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

async fn show_version() -> impl IntoResponse {
    format!("Serial Fanout v{}\n", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;
    use axum::{body::Body, http::Request};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn relay(mock: &MockPlatform) -> Relay {
        Relay::new(Config::default(), mock.platform()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn devices_route() {
        let mock = MockPlatform::new();
        let _port = mock.add_port("/dev/ttyACM0");

        let response = relay(&mock)
            .http_router()
            .oneshot(
                Request::builder()
                    .uri("/api/devices")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "success": true,
                "devices": [{ "path": "/dev/ttyACM0", "portType": "unknown" }]
            })
        );
    }

    #[tokio::test]
    async fn connect_route_with_garbage_is_tagged_not_rejected() {
        let response = relay(&MockPlatform::new())
            .http_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/connect")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn connect_route_failure() {
        let response = relay(&MockPlatform::new())
            .http_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/connect")
                    .body(Body::from(r#"{"port":"/dev/ttyGone"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("/dev/ttyGone"));
    }

    #[tokio::test]
    async fn version_route() {
        let response = relay(&MockPlatform::new())
            .http_router()
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Serial Fanout v"));
    }

    #[tokio::test]
    async fn config_route() {
        let config = Config {
            default_baud_rate: 115_200,
            ..Default::default()
        };
        let relay = Relay::new(config.clone(), MockPlatform::new().platform()).unwrap();

        let response = relay
            .http_router()
            .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let shown = Config::deserialize(&String::from_utf8_lossy(&bytes)).unwrap();

        assert_eq!(shown, config);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_route_with_non_utf8_path_is_an_error() {
        use std::os::unix::ffi::OsStrExt;

        let config = Config {
            public_dir: std::ffi::OsStr::from_bytes(b"pub\xff").into(),
            ..Default::default()
        };
        let relay = Relay::new(config, MockPlatform::new().platform()).unwrap();

        let response = relay
            .http_router()
            .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = Config {
            delimiter: String::new(),
            ..Default::default()
        };

        assert!(matches!(
            Relay::new(config, MockPlatform::new().platform()),
            Err(Error::BadConfig(_))
        ));
    }
}
