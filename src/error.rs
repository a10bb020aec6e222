use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// Listing the serial ports of the host failed.
    /// Holds the message of the underlying problem.
    #[error("{0}")]
    Enumeration(String),

    /// Opening a serial port failed.
    /// Holds the message of the underlying problem.
    #[error("{0}")]
    Open(String),

    /// Bad json.
    #[error("The request `{request}` could not be deserialized. Problem: {problem}")]
    BadJson {
        /// The problematic request.
        request: String,

        /// The deserialization issue.
        problem: String,
    },

    /// The configuration is not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A server could not be started, or stopped with an error.
    #[error("Server problem: {0}")]
    Server(String),

    /// Something unexpected happened while serving a request.
    #[error("Internal issue: {0}")]
    InternalIssue(String),
}

impl Error {
    /// Get the inner problem of a [`Error::BadConfig`], if it is one.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            Self::InternalIssue("The request handler panicked".into())
        } else {
            Self::InternalIssue(format!("The request handler did not finish: {e}"))
        }
    }
}
