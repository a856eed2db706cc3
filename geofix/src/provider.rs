//! Location provider abstraction.
//!
//! The coordinator talks to the platform's location source through the
//! [`LocationProvider`] trait:
//!
//! - `is_enabled` answers the availability gate at admission time
//! - `last_known` serves the synchronous fast path for one-shot requests
//! - `subscribe` opens the asynchronous event feed
//!
//! The feed is an unbounded channel (fire-and-forget from the provider's
//! side) so the coordinator never introduces gaps into a watch stream by
//! lagging behind a bounded buffer. The coordinator holds at most one
//! subscription regardless of how many requests are pending; fan-out to
//! requests happens inside the coordinator, not here.
//!
//! [`SimulatedProvider`] is a scriptable in-process implementation used by
//! the test suite and the CLI demo.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::outcome::FailureKind;
use crate::sample::LocationSample;

/// Default provider name callers get when they do not specify one.
pub const DEFAULT_PROVIDER: &str = "gps";

/// One event on the provider feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A new location fix.
    Update(LocationSample),

    /// The provider reported a failure. Classification is reused from the
    /// delivery taxonomy so routing needs no translation step.
    Error { kind: FailureKind, message: String },
}

/// Asynchronous, shared location source.
pub trait LocationProvider: Send + Sync {
    /// Whether at least one usable location source is currently enabled.
    ///
    /// Queried fresh at every admission; the answer can change between
    /// calls and must not be cached by callers.
    fn is_enabled(&self) -> bool;

    /// Most recent fix the provider already has on hand, if any.
    ///
    /// `preferred` names the source the caller favors (e.g. `"gps"`);
    /// providers with a single source may ignore it. Must not block or
    /// perform I/O — this backs the synchronous fast path.
    fn last_known(&self, preferred: &str) -> Option<LocationSample>;

    /// Open the event feed.
    ///
    /// The coordinator calls this at most once per lifecycle and fans the
    /// events out itself.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// Scriptable provider for tests and the CLI demo.
///
/// Fixes and errors are pushed by the test/demo harness; `last_known`
/// tracks the most recent pushed fix.
pub struct SimulatedProvider {
    enabled: AtomicBool,
    last_known: RwLock<Option<LocationSample>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl SimulatedProvider {
    /// Create an enabled provider with no cached fix.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            last_known: RwLock::new(None),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Flip provider availability.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Seed the cached last-known fix without emitting a feed event.
    pub fn set_last_known(&self, sample: LocationSample) {
        *self.last_known.write() = Some(sample);
    }

    /// Push a fix: updates the cache and broadcasts to every open feed.
    pub fn push_update(&self, sample: LocationSample) {
        *self.last_known.write() = Some(sample.clone());
        self.send(ProviderEvent::Update(sample));
    }

    /// Push a provider error onto every open feed.
    pub fn push_error(&self, kind: FailureKind, message: impl Into<String>) {
        self.send(ProviderEvent::Error {
            kind,
            message: message.into(),
        });
    }

    /// Number of live feed subscriptions (test hook for the singleton
    /// subscription invariant).
    pub fn subscriber_count(&self) -> usize {
        let mut feeds = self.feeds.lock();
        feeds.retain(|tx| !tx.is_closed());
        feeds.len()
    }

    fn send(&self, event: ProviderEvent) {
        let mut feeds = self.feeds.lock();
        feeds.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for SimulatedProvider {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn last_known(&self, _preferred: &str) -> Option<LocationSample> {
        self.last_known.read().clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().push(tx);
        rx
    }
}
