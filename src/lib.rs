#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The records pushed to connected viewers.
pub mod record;

/// The set of attached sinks, and publishing records to all of them.
pub mod broadcast;

/// Listing serial ports available on the host.
pub mod devices;

/// Serial port driver.
pub mod serial;

/// The request/response surface: list devices and open connections.
pub mod control;

/// Code relating to setting up the servers which handle the API and the push channel.
pub mod server;

/// Handles incoming websockets on the push channel.
pub(crate) mod websocket;

/// An in-memory platform, useful to test without the actual serial ports.
pub mod mock;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
