//! Fan-out of records to every attached viewer.
//!
//! The [`Registry`] is the only shared mutable state of the server.
//! It lives as long as the process does.
//! A publish holds its lock for the whole pass, so a sink removed during
//! a publish is never sent to afterwards within that pass.

use std::{collections::HashMap, fmt::Display, sync::Arc};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::record::Record;

/// The serialized form of a record, shared by all sinks it is sent to.
pub type Payload = Arc<str>;

/// Identifies a [`Sink`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SinkId(Uuid);

impl SinkId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attached viewer, able to receive serialized records.
///
/// The receiving end is given out on creation.
/// When it is dropped the sink counts as closed.
#[derive(Debug)]
pub struct Sink {
    id: SinkId,
    tx: mpsc::UnboundedSender<Payload>,
}

impl Sink {
    /// Create a sink, along with where its payloads end up.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                id: SinkId::new(),
                tx,
            },
            rx,
        )
    }

    /// The identity of this sink.
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Whether the receiving end is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, payload: Payload) -> Result<(), mpsc::error::SendError<Payload>> {
        self.tx.send(payload)
    }
}

/// The outcome of publishing a single record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// How many sinks got the record.
    pub delivered: usize,

    /// How many sinks were closed or failed, and were removed.
    pub evicted: usize,
}

/// The set of attached sinks.
///
/// Cloning gives a handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sinks: Arc<Mutex<HashMap<SinkId, Sink>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    /// It will get every record published from now on.
    pub async fn attach(&self, sink: Sink) {
        let mut sinks = self.sinks.lock().await;
        info!(id = %sink.id, attached = sinks.len() + 1, "Sink attached");

        sinks.insert(sink.id, sink);
    }

    /// Remove a sink.
    /// Returns whether it was present.
    pub async fn detach(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.lock().await;
        let was_present = sinks.remove(&id).is_some();

        if was_present {
            info!(%id, attached = sinks.len(), "Sink detached");
        } else {
            trace!(%id, "Sink already gone");
        }

        was_present
    }

    /// Send the record to every attached sink.
    ///
    /// The record is serialized once.
    /// Sinks which are closed, or which fail to take the record, are evicted.
    /// Nothing is retried.
    pub async fn publish(&self, record: &Record) -> Delivery {
        let payload = record.serialize();

        let mut sinks = self.sinks.lock().await;
        let before = sinks.len();

        sinks.retain(|id, sink| {
            if sink.is_closed() {
                debug!(%id, "Sink closed, evicting");
                return false;
            }

            match sink.send(payload.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(%id, "Send to sink failed, evicting");
                    false
                }
            }
        });

        let delivery = Delivery {
            delivered: sinks.len(),
            evicted: before - sinks.len(),
        };
        trace!(%record, ?delivery, "Published");

        delivery
    }

    /// The number of attached sinks.
    pub async fn len(&self) -> usize {
        self.sinks.lock().await.len()
    }

    /// Whether no sinks are attached.
    pub async fn is_empty(&self) -> bool {
        self.sinks.lock().await.is_empty()
    }

    /// Whether the given sink is attached.
    pub async fn contains(&self, id: SinkId) -> bool {
        self.sinks.lock().await.contains_key(&id)
    }

    /// The identities of all attached sinks, in no particular order.
    pub async fn ids(&self) -> Vec<SinkId> {
        self.sinks.lock().await.keys().copied().collect()
    }
}

/// Publish records to the registry in the order they arrive,
/// until the sender side goes away.
pub async fn dispatch(mut records: mpsc::UnboundedReceiver<Record>, registry: Registry) {
    debug!("Dispatching records");

    while let Some(record) = records.recv().await {
        registry.publish(&record).await;
    }

    debug!("No more records to dispatch");
}
