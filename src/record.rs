use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::serial::SerialMessage;

/// A unit of data pushed to every viewer.
///
/// On the wire this looks like `{"type":"data","data":"<line>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Record {
    /// A line of output from a serial device, without its delimiter.
    Data(SerialMessage),
}

impl Record {
    /// A data record holding the given line.
    pub fn data<S: Into<SerialMessage>>(line: S) -> Self {
        Self::Data(line.into())
    }

    /// Serialize the record as JSON text.
    ///
    /// The result is shared so the same allocation can be handed to every sink.
    pub fn serialize(&self) -> Arc<str> {
        serde_json::to_string(self)
            .expect("A record only holds a string, serializing cannot fail")
            .into()
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Data(message) => write!(f, "data: {message}"),
        }
    }
}
