use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Serial port related errors.
pub(crate) mod error;

/// The serial port structure.
pub mod serial_port;

/// Codecs for decoding messages from the wire.
pub mod codecs;

pub use serial_port::{
    ConnectionState, NativeOpener, PortOpener, PortReader, SerialPortBuilder, SerialPortHandle,
};

/// The default baud rate, used when a request does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// The message data type used for serial.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Deserialize, Serialize)]
pub struct SerialMessage(String);

impl SerialMessage {
    /// Create a serial message from bytes, ignoring any bad utf8 bytes.
    pub fn new_lossy<B: AsRef<[u8]>>(bytes: B) -> Self {
        Self(String::from_utf8_lossy(bytes.as_ref()).to_string())
    }
}

impl<T: AsRef<str>> From<T> for SerialMessage {
    fn from(string_like: T) -> Self {
        Self(string_like.as_ref().into())
    }
}

impl Display for SerialMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.chars().take(48).collect::<String>();

        write!(f, "{}", s.trim())
    }
}

/// The message data type used for serial bytes.
pub type SerialMessageBytes = Vec<u8>;
