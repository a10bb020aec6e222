use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncRead,
    sync::{mpsc, watch},
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, info_span, trace, Instrument};

use crate::{
    error::Error,
    record::Record,
    serial::{codecs::lines::LinesCodec, SerialMessage, DEFAULT_BAUD_RATE},
};

/// The readable half of an opened port.
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;

/// Something able to open serial ports.
///
/// Opening may block, so callers should not call this from within async code directly.
pub trait PortOpener: Send + Sync {
    /// Open the port at the given path.
    fn open(&self, path: &str, baud_rate: u32) -> Result<PortReader, Error>;
}

/// Opens actual serial ports on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl PortOpener for NativeOpener {
    fn open(&self, path: &str, baud_rate: u32) -> Result<PortReader, Error> {
        let serial_stream = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::Open(e.to_string()))?;

        Ok(Box::new(serial_stream))
    }
}

/// Where a serial connection is in its life.
///
/// `Unopened -> Opening -> Open -> (Failed | Closed)`.
/// There is no way back, a new connection has to be opened instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing has happened yet.
    Unopened,

    /// The port is being opened.
    Opening,

    /// Lines are being read.
    Open,

    /// Reading stopped because of an error.
    Failed,

    /// The port reached end of stream.
    Closed,
}

/// Builder for a [`SerialPortHandle`].
#[derive(Debug)]
pub struct SerialPortBuilder {
    path: String,
    baud_rate: Option<u32>,
    line_codec: Option<LinesCodec>,
    state: watch::Sender<ConnectionState>,
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The path should likely be along the lines of `/dev/ttyACMx` on unix, and `COMx` on Windows.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            baud_rate: None,
            line_codec: None,
            state: watch::channel(ConnectionState::Unopened).0,
        }
    }

    /// Watch the state of the connection, starting before the port is opened.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Set the serial port builder's baud rate.
    /// Will use [`DEFAULT_BAUD_RATE`] if not set.
    pub fn set_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Set the [`LinesCodec`] to use.
    /// Splits on `\r\n` if not set.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = Some(codec);
        self
    }

    /// Open the port and start reading lines from it.
    ///
    /// Errors if the port cannot be opened.
    /// May block while opening.
    pub fn build(self, opener: &dyn PortOpener) -> Result<SerialPortHandle, Error> {
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        let codec = self.line_codec.unwrap_or_default();

        let state_tx = self.state;
        let state_rx = state_tx.subscribe();

        info!(%self.path, %baud_rate, "Opening serial port");
        state_tx.send_replace(ConnectionState::Opening);

        let reader = match opener.open(&self.path, baud_rate) {
            Ok(reader) => reader,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Failed);
                info!(%self.path, %e, "Could not open serial port");
                return Err(e);
            }
        };

        state_tx.send_replace(ConnectionState::Open);

        let (records_tx, records_rx) = mpsc::unbounded_channel();

        let tty_span = info_span!("tty", %self.path);

        tokio::spawn(
            async move {
                let mut lines = FramedRead::new(reader, codec);

                let end_state = loop {
                    match lines.next().await {
                        Some(Ok(line)) => {
                            let message = SerialMessage::new_lossy(line);
                            trace!(%message, "Line from port");

                            if records_tx.send(Record::data(message)).is_err() {
                                debug!("Nobody is consuming records anymore");
                                break ConnectionState::Closed;
                            }
                        }
                        Some(Err(e)) => {
                            error!(%e, "Serial port error, exiting");
                            break ConnectionState::Failed;
                        }
                        None => {
                            info!("Serial port reached end of stream");
                            break ConnectionState::Closed;
                        }
                    }
                };

                state_tx.send_replace(end_state);
            }
            .instrument(tty_span),
        );

        Ok(SerialPortHandle {
            path: self.path,
            baud_rate,
            state: state_rx,
            records: Some(records_rx),
        })
    }
}

/// A serial port being read from.
#[derive(Debug)]
pub struct SerialPortHandle {
    path: String,
    baud_rate: u32,
    state: watch::Receiver<ConnectionState>,
    records: Option<mpsc::UnboundedReceiver<Record>>,
}

impl SerialPortHandle {
    /// The path of the port.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The baud rate the port was opened with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// The current state of the connection.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes of the connection.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Take the records read from the port, in the order they arrived.
    ///
    /// Only one consumer exists, so this returns `None` after the first call.
    pub fn take_records(&mut self) -> Option<mpsc::UnboundedReceiver<Record>> {
        self.records.take()
    }
}
