//! The control surface: listing devices and opening connections.
//!
//! No operation here returns an error to its caller.
//! Failures, including panics in the platform, become replies with `success: false`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    broadcast::{self, Registry},
    devices::{DeviceEnumerator, DeviceInfo, NativeEnumerator},
    error::Error,
    serial::{
        codecs::lines::LinesCodec, ConnectionState, NativeOpener, PortOpener, SerialPortBuilder,
        SerialPortHandle, DEFAULT_BAUD_RATE,
    },
};

/// The parts of the host the control surface talks to.
#[derive(Clone)]
pub struct Platform {
    /// Lists devices.
    pub enumerator: Arc<dyn DeviceEnumerator>,

    /// Opens ports.
    pub opener: Arc<dyn PortOpener>,
}

impl Platform {
    /// The actual serial ports of this host.
    pub fn native() -> Self {
        Self {
            enumerator: Arc::new(NativeEnumerator),
            opener: Arc::new(NativeOpener),
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

/// A request to open a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// The path of the port to open.
    pub port: String,

    /// The baud rate.
    /// May be given as a number or as a string holding a number.
    #[serde(
        default,
        deserialize_with = "baud_rate_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub baud_rate: Option<u32>,
}

impl ConnectRequest {
    /// An example request.
    pub fn example() -> Self {
        Self {
            port: "/dev/ttyACM0".into(),
            baud_rate: Some(115_200),
        }
    }

    /// Parse a request from a JSON body.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body).map_err(|e| Error::BadJson {
            request: body.into(),
            problem: e.to_string(),
        })
    }
}

fn baud_rate_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("`{s}` is not a valid baud rate"))),
    }
}

/// Reply to listing devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesReply {
    /// Whether listing worked.
    pub success: bool,

    /// The devices, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceInfo>>,

    /// The problem, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Vec<DeviceInfo>, Error>> for DevicesReply {
    fn from(result: Result<Vec<DeviceInfo>, Error>) -> Self {
        match result {
            Ok(devices) => Self {
                success: true,
                devices: Some(devices),
                error: None,
            },
            Err(e) => Self {
                success: false,
                devices: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Reply to opening a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    /// Whether the port was opened.
    pub success: bool,

    /// A human readable confirmation, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The problem, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, Error>> for ConnectReply {
    fn from(result: Result<String, Error>) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                message: Some(message),
                error: None,
            },
            Err(e) => Self {
                success: false,
                message: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// A connection which has been opened at some point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// The path of the port.
    pub path: String,

    /// The baud rate it was opened with.
    pub baud_rate: u32,

    /// Where the connection is now.
    pub state: ConnectionState,
}

/// Reply to listing connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionsReply {
    /// Always true, listing connections cannot fail.
    pub success: bool,

    /// Connections in the order they were opened.
    pub connections: Vec<ConnectionInfo>,
}

/// Lists devices and opens connections.
///
/// Opened connections feed their lines into the [`Registry`].
/// Opening a port while another is open is allowed,
/// both will then publish to the same viewers.
///
/// Cloning gives a handle to the same state.
#[derive(Debug, Clone)]
pub struct ControlApi {
    registry: Registry,
    platform: Platform,
    default_baud_rate: u32,
    delimiter: Vec<u8>,
    // Never pruned.
    connections: Arc<Mutex<Vec<SerialPortHandle>>>,
}

impl ControlApi {
    /// Create the control surface.
    /// Lines are split on `\r\n` and the default baud rate is [`DEFAULT_BAUD_RATE`].
    pub fn new(registry: Registry, platform: Platform) -> Self {
        Self {
            registry,
            platform,
            default_baud_rate: DEFAULT_BAUD_RATE,
            delimiter: b"\r\n".to_vec(),
            connections: Arc::default(),
        }
    }

    /// Use this baud rate when a request does not name one.
    pub fn with_default_baud_rate(mut self, baud_rate: u32) -> Self {
        self.default_baud_rate = baud_rate;
        self
    }

    /// Split lines on this delimiter.
    ///
    /// Panics if the delimiter is empty.
    pub fn with_delimiter<D: AsRef<[u8]>>(mut self, delimiter: D) -> Self {
        assert!(!delimiter.as_ref().is_empty(), "A line delimiter cannot be empty");
        self.delimiter = delimiter.as_ref().to_vec();
        self
    }

    /// The registry records are published to.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// List the serial devices of the platform.
    pub async fn list_devices(&self) -> DevicesReply {
        let enumerator = self.platform.enumerator.clone();

        let result = tokio::task::spawn_blocking(move || enumerator.list())
            .await
            .map_err(Error::from)
            .and_then(|result| result);

        match &result {
            Ok(devices) => info!(devices = devices.len(), "Listed devices"),
            Err(e) => warn!(%e, "Listing devices failed"),
        }

        result.into()
    }

    /// Open a connection, and publish its lines to the registry.
    ///
    /// Returns as soon as the port is opened (or failed to).
    /// Uses the default baud rate if none is given.
    pub async fn open_connection(&self, path: &str, baud_rate: Option<u32>) -> ConnectReply {
        let baud_rate = baud_rate.unwrap_or(self.default_baud_rate);
        let span = info_span!("Connect", %path, %baud_rate);

        self.do_open_connection(path, baud_rate)
            .instrument(span)
            .await
            .into()
    }

    async fn do_open_connection(&self, path: &str, baud_rate: u32) -> Result<String, Error> {
        let opener = self.platform.opener.clone();
        let builder = SerialPortBuilder::new(path)
            .set_baud_rate(baud_rate)
            .set_line_codec(LinesCodec::new(&self.delimiter));

        let result = tokio::task::spawn_blocking(move || builder.build(&*opener)).await;

        let mut handle = match result.map_err(Error::from).and_then(|result| result) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(%e, "Could not connect");
                return Err(e);
            }
        };

        if let Some(records) = handle.take_records() {
            tokio::spawn(
                broadcast::dispatch(records, self.registry.clone())
                    .instrument(info_span!("Dispatch", %path)),
            );
        }

        self.connections.lock().await.push(handle);

        let message = format!("Connected to {path} at {baud_rate} baud");
        info!(message);

        Ok(message)
    }

    /// Parse a JSON request body and open the connection it asks for.
    pub async fn connect_json(&self, body: &str) -> ConnectReply {
        match ConnectRequest::from_json(body) {
            Ok(request) => self.open_connection(&request.port, request.baud_rate).await,
            Err(e) => {
                warn!(%e, "Bad connect request");
                Err::<String, _>(e).into()
            }
        }
    }

    /// Connections opened so far, and their current states.
    ///
    /// This is a history: connections that have failed or closed are kept.
    pub async fn connections(&self) -> ConnectionsReply {
        let connections = self
            .connections
            .lock()
            .await
            .iter()
            .map(|handle| ConnectionInfo {
                path: handle.path().into(),
                baud_rate: handle.baud_rate(),
                state: handle.state(),
            })
            .collect();

        ConnectionsReply {
            success: true,
            connections,
        }
    }
}
