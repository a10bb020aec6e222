use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::Error, serial::DEFAULT_BAUD_RATE};

/// The configuration used for running the servers.
///
/// Every field may be omitted in a configuration file, defaults are used instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The port of the HTTP server (API and static files).
    pub http_port: u16,

    /// The port of the websocket server pushing records to viewers.
    pub push_port: u16,

    /// Files in this directory are served as-is.
    pub public_dir: PathBuf,

    /// Used when a connect request does not name a baud rate.
    pub default_baud_rate: u32,

    /// Serial output is split into lines on this.
    pub delimiter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            push_port: 8080,
            public_dir: PathBuf::from("public"),
            default_baud_rate: DEFAULT_BAUD_RATE,
            delimiter: "\r\n".into(),
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            http_port: 3000,
            push_port: 8080,
            public_dir: PathBuf::from("/srv/serial-fanout/public"),
            default_baud_rate: 115_200,
            delimiter: "\n".into(),
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    ///
    /// Errors if a path is not valid UTF-8.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(format!("Could not serialize: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|e| {
            Error::BadConfig(format!("Could not read {}: {e}", p.as_ref().display()))
        })?;

        Self::deserialize(&s)
    }

    /// Check the configuration makes sense.
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter.is_empty() {
            return Err(Error::BadConfig(
                "The line delimiter is empty. Lines could never be split, please use e.g. \"\\r\\n\"."
                    .into(),
            ));
        }

        if self.default_baud_rate == 0 {
            return Err(Error::BadConfig(
                "The default baud rate is zero, please use e.g. 9600.".into(),
            ));
        }

        // Zero means "any port", which is allowed for both.
        if self.http_port != 0 && self.http_port == self.push_port {
            return Err(Error::BadConfig(format!(
                "The HTTP server and the push server cannot share port {}.",
                self.http_port
            )));
        }

        Ok(())
    }
}
