//! Result sinks — per-request delivery targets.
//!
//! Every request owns its own sink, stored alongside the request in the
//! coordinator registry. There is deliberately no shared "current caller"
//! field anywhere: a later call can never overwrite the delivery target of
//! an earlier in-flight request.
//!
//! Sinks may re-enter the coordinator from inside [`ResultSink::deliver`]
//! (e.g. a one-shot caller immediately re-registering). The coordinator
//! guarantees it never invokes a sink while holding its registry lock, so
//! re-entrant sinks cannot deadlock.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::outcome::Failure;
use crate::sample::LocationSample;

/// One delivery pushed to a request sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A location fix. `keep_open` is true for watch deliveries (the sink
    /// stays live for further fixes) and false for one-shot deliveries.
    Sample {
        sample: LocationSample,
        keep_open: bool,
    },

    /// A failure outcome. `keep_open` follows the same rule as `Sample`.
    Failure { failure: Failure, keep_open: bool },

    /// A bare acknowledgement with no payload: `clearWatch` confirmation
    /// and a fully granted permission flow.
    Ack,
}

impl Delivery {
    /// Convenience accessor for the sample of a `Sample` delivery.
    pub fn sample(&self) -> Option<&LocationSample> {
        match self {
            Delivery::Sample { sample, .. } => Some(sample),
            _ => None,
        }
    }

    /// Convenience accessor for the failure of a `Failure` delivery.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Delivery::Failure { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Where to deliver outcomes for one request.
///
/// Implementations must tolerate the caller having gone away; delivery is
/// best-effort and must never panic or block.
pub trait ResultSink: Send + Sync {
    /// Deliver one outcome to the original caller.
    fn deliver(&self, delivery: Delivery);
}

/// Shared handle to a request sink.
pub type SinkHandle = Arc<dyn ResultSink>;

/// Sink backed by an unbounded tokio channel.
///
/// The natural bridge to an async caller: the caller holds the receiver
/// and awaits deliveries. A closed receiver makes delivery a silent no-op.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    /// Create a sink and the receiver the caller will await on.
    pub fn new() -> (SinkHandle, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ResultSink for ChannelSink {
    fn deliver(&self, delivery: Delivery) {
        // Receiver gone means the caller stopped listening; nothing to do.
        let _ = self.tx.send(delivery);
    }
}

/// Test double that records every delivery in order.
pub struct CollectingSink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CollectingSink {
    /// Create an empty collecting sink behind a shared handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of everything delivered so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Number of deliveries so far.
    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// True when nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }
}

impl ResultSink for CollectingSink {
    fn deliver(&self, delivery: Delivery) {
        self.deliveries.lock().push(delivery);
    }
}
