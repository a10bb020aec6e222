use std::io;

use thiserror::Error;

/// Problems reading from a serial port.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),
}
