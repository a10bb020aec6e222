//! A mock platform, useful to test serial port functionality without the actual serial ports.
//!
//! Ports are added by path and then handed out once when opened.
//! Whatever is written to a [`MockPort`] is what the opened port reads.

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::{
    control::Platform,
    devices::{DeviceEnumerator, DeviceInfo},
    error::Error,
    serial::{PortOpener, PortReader},
};

type Chunk = io::Result<Bytes>;

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceInfo>,

    // Readers not yet opened.
    // Taken (set to `None`) on open, so a port can only be opened once.
    readers: HashMap<String, Option<mpsc::UnboundedReceiver<Chunk>>>,

    // Set to make listing devices fail with this message.
    enumeration_failure: Option<String>,
}

/// A platform with in-memory serial ports.
///
/// Cloning gives a handle to the same ports.
#[derive(Debug, Default, Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    /// A platform without any ports.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a port at the given path.
    /// It is listed as a device and can be opened once.
    pub fn add_port(&self, path: &str) -> MockPort {
        info!(%path, "Adding mock port");

        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state();
        state.devices.push(DeviceInfo::new(path));
        state.readers.insert(path.into(), Some(rx));

        MockPort {
            path: path.into(),
            tx,
        }
    }

    /// Make listing devices fail with the given message.
    pub fn fail_enumeration(&self, message: &str) {
        self.state().enumeration_failure = Some(message.into());
    }

    /// This mock as a [`Platform`].
    pub fn platform(&self) -> Platform {
        Platform {
            enumerator: Arc::new(self.clone()),
            opener: Arc::new(self.clone()),
        }
    }
}

impl DeviceEnumerator for MockPlatform {
    fn list(&self) -> Result<Vec<DeviceInfo>, Error> {
        let state = self.state();

        match &state.enumeration_failure {
            Some(message) => Err(Error::Enumeration(message.clone())),
            None => Ok(state.devices.clone()),
        }
    }
}

impl PortOpener for MockPlatform {
    fn open(&self, path: &str, baud_rate: u32) -> Result<PortReader, Error> {
        debug!(%path, %baud_rate, "Opening mock port");

        if baud_rate == 0 {
            return Err(Error::Open(format!("Invalid baud rate: {baud_rate}")));
        }

        let mut state = self.state();

        match state.readers.get_mut(path) {
            None => Err(Error::Open(format!(
                "Error: No such file or directory, cannot open {path}"
            ))),
            Some(reader) => match reader.take() {
                None => Err(Error::Open(format!(
                    "Error: Resource temporarily unavailable, cannot lock port {path}"
                ))),
                Some(rx) => Ok(Box::new(StreamReader::new(
                    UnboundedReceiverStream::new(rx),
                ))),
            },
        }
    }
}

/// The device side of a mock port.
///
/// Dropping it (or calling [`MockPort::hang_up`]) ends the stream for the reader.
#[derive(Debug)]
pub struct MockPort {
    path: String,
    tx: mpsc::UnboundedSender<Chunk>,
}

impl MockPort {
    /// Put these bytes on the wire.
    pub fn write<B: AsRef<[u8]>>(&self, bytes: B) {
        if self
            .tx
            .send(Ok(Bytes::copy_from_slice(bytes.as_ref())))
            .is_err()
        {
            debug!(%self.path, "Mock port written to, but nobody reads it");
        }
    }

    /// Make the reader see an IO error.
    pub fn fail(&self, message: &str) {
        if self
            .tx
            .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, message)))
            .is_err()
        {
            debug!(%self.path, "Mock port failed, but nobody reads it");
        }
    }

    /// The device goes away.
    pub fn hang_up(self) {
        debug!(%self.path, "Hanging up mock port");
    }
}
