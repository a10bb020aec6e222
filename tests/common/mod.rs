#![allow(dead_code)]

use std::time::Duration;

use color_eyre::Result;
use futures::StreamExt;
use hyper::{Body, Client, Method, Request};
use serial_fanout::{
    broadcast::Registry,
    config::Config,
    mock::MockPlatform,
    record::Record,
    server::{AllocatedPorts, Relay},
};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;

pub type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub relay: Relay,
    pub ports: AllocatedPorts,
    pub mock: MockPlatform,
}

impl TestServer {
    pub fn registry(&self) -> &Registry {
        self.relay.registry()
    }
}

pub async fn start_server() -> TestServer {
    start_server_with_config(Config::default()).await
}

pub async fn start_server_with_config(config: Config) -> TestServer {
    let config = Config {
        http_port: 0,
        push_port: 0,
        ..config
    };

    let mock = MockPlatform::new();
    let relay = Relay::new(config, mock.platform()).expect("Config should be valid");

    let (port_tx, port_rx) = oneshot::channel();

    let serving = relay.clone();
    tokio::spawn(async move { serving.serve(Some(port_tx)).await });

    let ports = port_rx
        .await
        .expect("Server should reply with allocated ports");

    TestServer { relay, ports, mock }
}

pub async fn connect(server: &TestServer) -> Result<Viewer> {
    connect_path(server, "/").await
}

pub async fn connect_path(server: &TestServer, path: &str) -> Result<Viewer> {
    let port = server.ports.push;
    info!("Connecting viewer to port {port}");

    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}{path}")).await?;

    assert_eq!(
        http_response.status(),
        hyper::StatusCode::SWITCHING_PROTOCOLS
    );

    Ok(stream)
}

/// The websocket handshake finishes before the server attaches the viewer,
/// so wait for the registry to catch up.
pub async fn wait_for_viewers(server: &TestServer, count: usize) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        while server.registry().len().await != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    Ok(())
}

pub async fn receive(viewer: &mut Viewer) -> Result<Record> {
    let message = timeout(Duration::from_secs(5), viewer.next())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    let record = serde_json::from_str(message.to_text()?)?;

    Ok(record)
}

/// Nothing more arrives within a short while.
pub async fn assert_silent(viewer: &mut Viewer) {
    assert!(timeout(Duration::from_millis(100), viewer.next())
        .await
        .is_err());
}

pub async fn http_get(server: &TestServer, path: &str) -> Result<(hyper::StatusCode, String)> {
    let uri = format!("http://127.0.0.1:{}{path}", server.ports.http).parse()?;
    let response = Client::new().get(uri).await?;

    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await?;

    Ok((status, String::from_utf8(body.to_vec())?))
}

pub async fn http_post(server: &TestServer, path: &str, body: String) -> Result<serde_json::Value> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://127.0.0.1:{}{path}", server.ports.http))
        .header("content-type", "application/json")
        .body(Body::from(body))?;

    let response = Client::new().request(request).await?;
    let body = hyper::body::to_bytes(response.into_body()).await?;

    Ok(serde_json::from_slice(&body)?)
}
