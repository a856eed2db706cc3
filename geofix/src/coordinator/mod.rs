//! Location request coordinator.
//!
//! The [`LocationRequestCoordinator`] bridges callers to the shared
//! asynchronous location provider. It tracks every pending one-shot and
//! watch request, holds the single provider subscription, fans provider
//! updates and errors out to the right requests, enforces per-request
//! deadlines, and supports cancellation mid-flight.
//!
//! # Architecture
//!
//! ```text
//!  caller ──► request_once / add_watch / clear_watch
//!                     │  (admission gating: permission, availability,
//!                     │   cache fast path)
//!                     ▼
//!              ┌──────────────┐        ┌──────────────────┐
//!              │   Registry   │◄───────│ subscription pump │◄── provider feed
//!              │ (one mutex)  │        └──────────────────┘
//!              └──────┬───────┘                 ▲
//!                     │ drain / snapshot        │ lazily created once
//!                     ▼
//!              per-request ResultSink deliveries
//!                     ▲
//!              timeout tasks (one per finite deadline)
//! ```
//!
//! # Locking discipline
//!
//! The registry mutex is the only shared mutable state. Critical sections
//! are bounded: entries are drained or snapshotted under the lock and every
//! sink is invoked after release, so a sink that re-enters the coordinator
//! cannot deadlock, and removal never waits on an in-flight delivery.
//!
//! Delivery/timeout/cancel races all resolve the same way: whichever path
//! removes the entry from the registry first owns the terminal delivery,
//! the loser finds nothing and is a no-op.
//!
//! # Permission grant flow
//!
//! Admission with a missing permission fails the current request
//! immediately with `PermissionUnavailable`, and as a side effect triggers
//! the external grant flow with the request's sink registered as a grant
//! waiter. When [`LocationRequestCoordinator::on_permission_result`]
//! reports the flow's outcome, each waiter receives an `Ack` (full grant,
//! retry your request) or a second `PermissionUnavailable` (any denial).
//!
//! All methods expect to run inside a tokio runtime; the subscription pump
//! and timeout timers are spawned tasks.

mod registry;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::outcome::{CoordinatorError, Failure, FailureKind};
use crate::permission::PermissionGate;
use crate::provider::{LocationProvider, ProviderEvent};
use crate::sample::{now_ms, LocationSample};
use crate::sink::{Delivery, SinkHandle};

use registry::Registry;

type SharedRegistry = Arc<Mutex<Registry>>;

// ─────────────────────────────────────────────────────────────────────────────
// Request options
// ─────────────────────────────────────────────────────────────────────────────

/// Options for a one-shot location request.
#[derive(Debug, Clone, Default)]
pub struct OneShotOptions {
    /// Caller-supplied id; may be empty for anonymous requests.
    pub caller_id: String,

    /// Acceptable staleness for the cached-sample fast path. Zero demands
    /// a brand-new fix.
    pub max_age: Duration,

    /// Preferred provider name; the configured default when `None`.
    pub provider: Option<String>,

    /// Deadline relative to registration. Falls back to the configured
    /// default; `None` there too means the request never expires.
    pub deadline: Option<Duration>,
}

impl OneShotOptions {
    /// Set the caller id.
    pub fn with_caller_id(mut self, id: impl Into<String>) -> Self {
        self.caller_id = id.into();
        self
    }

    /// Set the acceptable staleness bound.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the preferred provider name.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set a finite deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Handle returned by [`LocationRequestCoordinator::request_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneShotTicket {
    seq: Option<u64>,
}

impl OneShotTicket {
    fn pending(seq: u64) -> Self {
        Self { seq: Some(seq) }
    }

    fn resolved() -> Self {
        Self { seq: None }
    }

    /// Whether the request is still waiting on the provider. False when it
    /// was satisfied synchronously (fast path) or failed at admission.
    pub fn is_pending(&self) -> bool {
        self.seq.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Tracks pending location requests and routes provider events to them.
///
/// Explicitly owned: construct one per session, call
/// [`shutdown`](Self::shutdown) when done (also runs on drop). All methods
/// take `&self` and are safe to call from any task.
pub struct LocationRequestCoordinator {
    provider: Arc<dyn LocationProvider>,
    gate: Arc<dyn PermissionGate>,
    config: CoordinatorConfig,
    registry: SharedRegistry,
    shutdown_token: CancellationToken,
}

impl LocationRequestCoordinator {
    /// Create a coordinator over the given provider and permission gate.
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        gate: Arc<dyn PermissionGate>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            provider,
            gate,
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
            shutdown_token: CancellationToken::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Public operations
    // ─────────────────────────────────────────────────────────────────────

    /// Request a single location fix.
    ///
    /// A cached fix no older than `opts.max_age` is delivered immediately
    /// and synchronously with no provider round-trip and no subscription
    /// creation. Otherwise the request is registered and resolved by the
    /// next provider event, or by its deadline if one applies.
    ///
    /// Admission failures (permission, availability) are delivered through
    /// the sink, not returned; see the module docs for the grant-flow
    /// interaction.
    pub fn request_once(&self, opts: OneShotOptions, sink: SinkHandle) -> OneShotTicket {
        if self.registry.lock().shut_down {
            tracing::debug!(caller = %opts.caller_id, "one-shot dropped, coordinator shut down");
            return OneShotTicket::resolved();
        }

        if let Some(failure) = self.admission_failure(&sink) {
            tracing::debug!(caller = %opts.caller_id, %failure, "one-shot rejected at admission");
            sink.deliver(Delivery::Failure {
                failure,
                keep_open: false,
            });
            return OneShotTicket::resolved();
        }

        // Fast path: a sufficiently fresh cached fix saves the provider
        // round-trip (and battery, on real hardware).
        let provider_name = opts
            .provider
            .as_deref()
            .unwrap_or(self.config.default_provider.as_str());
        if let Some(last) = self.provider.last_known(provider_name) {
            if last.is_fresh_at(now_ms(), opts.max_age) {
                tracing::debug!(
                    caller = %opts.caller_id,
                    age_ms = last.age_at(now_ms()).as_millis() as u64,
                    "one-shot satisfied from cached fix"
                );
                sink.deliver(Delivery::Sample {
                    sample: last,
                    keep_open: false,
                });
                return OneShotTicket::resolved();
            }
        }

        let seq = {
            let mut reg = self.registry.lock();
            // Shutdown may have raced the admission checks; a request
            // registered now would never be drained.
            if reg.shut_down {
                return OneShotTicket::resolved();
            }
            let seq = reg.insert_one_shot(opts.caller_id.clone(), sink);
            self.ensure_subscription(&mut reg);
            seq
        };

        if let Some(deadline) = opts.deadline.or(self.config.default_deadline) {
            self.schedule_timeout(seq, deadline);
        }

        tracing::debug!(seq, caller = %opts.caller_id, "one-shot registered, awaiting provider");
        OneShotTicket::pending(seq)
    }

    /// Register a standing watch under `id`.
    ///
    /// Fails synchronously with [`CoordinatorError::DuplicateWatch`] when
    /// `id` is already active. Gating failures are delivered through the
    /// sink as a single failure; the watch is not registered in that case.
    pub fn add_watch(&self, id: &str, sink: SinkHandle) -> Result<(), CoordinatorError> {
        {
            let reg = self.registry.lock();
            if reg.shut_down {
                tracing::debug!(id, "watch dropped, coordinator shut down");
                return Ok(());
            }
            if reg.contains_watch(id) {
                return Err(CoordinatorError::DuplicateWatch(id.to_string()));
            }
        }

        if let Some(failure) = self.admission_failure(&sink) {
            tracing::debug!(id, %failure, "watch rejected at admission");
            sink.deliver(Delivery::Failure {
                failure,
                keep_open: false,
            });
            return Ok(());
        }

        let mut reg = self.registry.lock();
        if reg.shut_down {
            return Ok(());
        }
        // Re-checked under the lock: two concurrent add_watch calls with
        // the same id can both pass the early check.
        reg.insert_watch(id, sink)?;
        self.ensure_subscription(&mut reg);
        drop(reg);

        tracing::debug!(id, "watch registered");
        Ok(())
    }

    /// Cancel the watch registered under `id`.
    ///
    /// Best-effort: an unknown id is a no-op, never an error. The id is
    /// free for re-registration as soon as this returns.
    pub fn clear_watch(&self, id: &str) {
        let removed = self.registry.lock().remove_watch(id);
        match removed {
            Some(_) => tracing::debug!(id, "watch cleared"),
            None => tracing::debug!(id, "clear_watch for unknown id ignored"),
        }
    }

    /// Route a provider fix to every pending request.
    ///
    /// One-shots terminate on this delivery; watches receive it and stay
    /// active. Normally driven by the subscription pump.
    pub fn on_provider_update(&self, sample: LocationSample) {
        route_update(&self.registry, sample);
    }

    /// Route a provider failure.
    ///
    /// Terminates every pending one-shot with the failure. Active watches
    /// are deliberately not terminated and not notified: a transient
    /// provider error must not silently kill a long-lived subscription.
    pub fn on_provider_error(&self, kind: FailureKind, message: &str) {
        route_error(&self.registry, kind, message);
    }

    /// Report the outcome of the external permission-grant flow.
    ///
    /// `grants` holds one boolean per requested capability. A single
    /// denial fails every waiting caller context with
    /// `PermissionUnavailable`; a full grant acknowledges them (the caller
    /// is expected to retry its original request).
    pub fn on_permission_result(&self, grants: &[bool]) {
        let waiters = self.registry.lock().drain_grant_waiters();
        if waiters.is_empty() {
            return;
        }

        let denied = grants.iter().any(|granted| !granted);
        tracing::info!(waiters = waiters.len(), denied, "permission grant flow completed");
        for sink in waiters {
            if denied {
                sink.deliver(Delivery::Failure {
                    failure: Failure::permission_unavailable(),
                    keep_open: false,
                });
            } else {
                sink.deliver(Delivery::Ack);
            }
        }
    }

    /// Tear the coordinator down.
    ///
    /// Every pending request is cancelled silently (no wire delivery) and
    /// the provider subscription is released. Safe to call multiple times;
    /// also runs on drop.
    pub fn shutdown(&self) {
        let (mut one_shots, watches, waiters, pump) = {
            let mut reg = self.registry.lock();
            if reg.shut_down {
                return;
            }
            reg.shut_down = true;
            (
                reg.drain_one_shots(),
                reg.drain_watches(),
                reg.drain_grant_waiters(),
                reg.pump.take(),
            )
        };

        self.shutdown_token.cancel();

        for entry in &mut one_shots {
            entry.abort_timeout();
        }
        tracing::info!(
            one_shots = one_shots.len(),
            watches = watches.len(),
            grant_waiters = waiters.len(),
            "coordinator shut down, pending requests cancelled"
        );
        // Cancelled requests get no delivery; dropping the entries is the
        // whole termination.
        drop(one_shots);
        drop(watches);
        drop(waiters);

        if let Some(pump) = pump {
            pump.abort();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection (primarily for tests and status reporting)
    // ─────────────────────────────────────────────────────────────────────

    /// Number of one-shot requests currently awaiting the provider.
    pub fn pending_one_shots(&self) -> usize {
        self.registry.lock().one_shot_count()
    }

    /// Number of active watches.
    pub fn active_watches(&self) -> usize {
        self.registry.lock().watch_count()
    }

    /// Whether the provider subscription is currently held.
    pub fn has_subscription(&self) -> bool {
        self.registry.lock().pump.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Admission gating shared by both request kinds.
    ///
    /// Permission first: availability cannot be answered meaningfully
    /// without it. A missing permission registers the request's sink as a
    /// grant waiter and triggers the external flow as a side effect; the
    /// current call still fails immediately and the caller retries after
    /// the grant.
    fn admission_failure(&self, sink: &SinkHandle) -> Option<Failure> {
        if !self.gate.has_permission() {
            self.registry.lock().push_grant_waiter(sink.clone());
            self.gate.request_grant();
            return Some(Failure::permission_unavailable());
        }
        if !self.provider.is_enabled() {
            return Some(Failure::provider_unavailable());
        }
        None
    }

    /// Lazily start the single subscription pump. Caller holds the lock.
    fn ensure_subscription(&self, reg: &mut Registry) {
        if reg.pump.is_some() {
            return;
        }
        let rx = self.provider.subscribe();
        let registry = Arc::clone(&self.registry);
        let token = self.shutdown_token.clone();
        reg.pump = Some(tokio::spawn(pump_loop(rx, registry, token)));
        tracing::debug!("provider subscription opened");
    }

    /// Schedule expiry for a registered one-shot.
    ///
    /// The entry is inserted before the timer is spawned, so a firing
    /// timer always finds either the live entry or nothing; if the request
    /// terminated before the handle could be attached, the fresh timer is
    /// aborted here.
    fn schedule_timeout(&self, seq: u64, deadline: Duration) {
        let registry = Arc::clone(&self.registry);
        let token = self.shutdown_token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(deadline) => {}
            }
            let entry = registry.lock().remove_one_shot(seq);
            if let Some(entry) = entry {
                tracing::debug!(seq, caller = %entry.caller_id, "one-shot deadline elapsed");
                entry.sink.deliver(Delivery::Failure {
                    failure: Failure::timeout(),
                    keep_open: false,
                });
            }
        });

        if let Err(handle) = self.registry.lock().attach_timeout(seq, handle) {
            // Request already terminated while the timer was being spawned.
            handle.abort();
        }
    }
}

impl Drop for LocationRequestCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider event routing
// ─────────────────────────────────────────────────────────────────────────────

/// Long-running pump: the coordinator's single subscription to the feed.
async fn pump_loop(
    mut rx: mpsc::UnboundedReceiver<ProviderEvent>,
    registry: SharedRegistry,
    token: CancellationToken,
) {
    tracing::debug!("subscription pump started");
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            event = rx.recv() => match event {
                Some(ProviderEvent::Update(sample)) => route_update(&registry, sample),
                Some(ProviderEvent::Error { kind, message }) => {
                    route_error(&registry, kind, &message)
                }
                None => break,
            }
        }
    }
    tracing::debug!("subscription pump stopped");
}

/// Deliver a fix: terminal for one-shots, pass-through for watches.
fn route_update(registry: &SharedRegistry, sample: LocationSample) {
    let (mut one_shots, watch_sinks) = {
        let mut reg = registry.lock();
        (reg.drain_one_shots(), reg.watch_sinks())
    };

    tracing::debug!(
        one_shots = one_shots.len(),
        watches = watch_sinks.len(),
        lat = sample.latitude,
        lon = sample.longitude,
        "routing provider fix"
    );

    for entry in &mut one_shots {
        entry.abort_timeout();
        entry.sink.deliver(Delivery::Sample {
            sample: sample.clone(),
            keep_open: false,
        });
    }
    for sink in watch_sinks {
        sink.deliver(Delivery::Sample {
            sample: sample.clone(),
            keep_open: true,
        });
    }
}

/// Deliver a provider failure to pending one-shots only.
fn route_error(registry: &SharedRegistry, kind: FailureKind, message: &str) {
    let mut one_shots = registry.lock().drain_one_shots();
    if one_shots.is_empty() {
        tracing::debug!(%kind, message, "provider error with no pending one-shots");
        return;
    }

    tracing::warn!(%kind, message, one_shots = one_shots.len(), "provider error");
    for entry in &mut one_shots {
        entry.abort_timeout();
        entry.sink.deliver(Delivery::Failure {
            failure: Failure::new(kind, message),
            keep_open: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::StaticPermissionGate;
    use crate::provider::SimulatedProvider;
    use crate::sink::CollectingSink;

    struct Fixture {
        provider: Arc<SimulatedProvider>,
        gate: Arc<StaticPermissionGate>,
        coordinator: LocationRequestCoordinator,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(SimulatedProvider::new());
        let gate = Arc::new(StaticPermissionGate::new(true));
        let coordinator = LocationRequestCoordinator::new(
            Arc::clone(&provider) as Arc<dyn LocationProvider>,
            Arc::clone(&gate) as Arc<dyn PermissionGate>,
            CoordinatorConfig::default(),
        );
        Fixture {
            provider,
            gate,
            coordinator,
        }
    }

    fn sample_aged(age_ms: i64) -> LocationSample {
        LocationSample::new(1.0, 2.0, 10.0, now_ms() - age_ms)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fast path
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fresh_cached_sample_resolves_synchronously() {
        let fx = fixture();
        fx.provider.set_last_known(sample_aged(3_000));

        let sink = CollectingSink::new();
        let ticket = fx.coordinator.request_once(
            OneShotOptions::default().with_max_age(Duration::from_millis(5_000)),
            sink.clone(),
        );

        assert!(!ticket.is_pending());
        assert_eq!(sink.len(), 1);
        assert!(sink.deliveries()[0].sample().is_some());
        // Pure optimization path: no subscription was created.
        assert!(!fx.coordinator.has_subscription());
        assert_eq!(fx.provider.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_cached_sample_registers_pending_request() {
        let fx = fixture();
        fx.provider.set_last_known(sample_aged(9_000));

        let sink = CollectingSink::new();
        let ticket = fx.coordinator.request_once(
            OneShotOptions::default().with_max_age(Duration::from_millis(5_000)),
            sink.clone(),
        );

        assert!(ticket.is_pending());
        assert!(sink.is_empty());
        assert!(fx.coordinator.has_subscription());

        fx.provider.push_update(sample_aged(0));
        settle().await;

        assert_eq!(sink.len(), 1);
        assert_eq!(fx.coordinator.pending_one_shots(), 0);
    }

    #[tokio::test]
    async fn test_no_cached_sample_waits_for_provider() {
        let fx = fixture();
        let sink = CollectingSink::new();
        let ticket = fx
            .coordinator
            .request_once(OneShotOptions::default(), sink.clone());

        assert!(ticket.is_pending());
        assert!(sink.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gating
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_permission_denied_fails_without_touching_provider() {
        let fx = fixture();
        fx.gate.set_granted(false);
        fx.provider.set_last_known(sample_aged(0));

        let sink = CollectingSink::new();
        let ticket = fx.coordinator.request_once(
            OneShotOptions::default().with_max_age(Duration::from_secs(60)),
            sink.clone(),
        );

        assert!(!ticket.is_pending());
        let failure = sink.deliveries()[0].failure().cloned().unwrap();
        assert_eq!(failure.kind, FailureKind::PermissionUnavailable);
        // Grant flow triggered as a side effect, subscription untouched.
        assert_eq!(fx.gate.grant_requests(), 1);
        assert!(!fx.coordinator.has_subscription());
        assert_eq!(fx.provider.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_admission() {
        let fx = fixture();
        fx.provider.set_enabled(false);

        let sink = CollectingSink::new();
        fx.coordinator
            .request_once(OneShotOptions::default(), sink.clone());

        let failure = sink.deliveries()[0].failure().cloned().unwrap();
        assert_eq!(failure.kind, FailureKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn test_watch_gating_failure_is_delivered_not_registered() {
        let fx = fixture();
        fx.provider.set_enabled(false);

        let sink = CollectingSink::new();
        fx.coordinator.add_watch("w1", sink.clone()).unwrap();

        assert_eq!(fx.coordinator.active_watches(), 0);
        let failure = sink.deliveries()[0].failure().cloned().unwrap();
        assert_eq!(failure.kind, FailureKind::ProviderUnavailable);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Watches
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_duplicate_watch_id_fails_synchronously() {
        let fx = fixture();
        fx.coordinator
            .add_watch("w1", CollectingSink::new())
            .unwrap();

        let err = fx
            .coordinator
            .add_watch("w1", CollectingSink::new())
            .unwrap_err();
        assert_eq!(err, CoordinatorError::DuplicateWatch("w1".into()));
    }

    #[tokio::test]
    async fn test_watch_id_reusable_after_clear() {
        let fx = fixture();
        fx.coordinator
            .add_watch("w1", CollectingSink::new())
            .unwrap();
        fx.coordinator.clear_watch("w1");
        assert!(fx.coordinator.add_watch("w1", CollectingSink::new()).is_ok());
    }

    #[tokio::test]
    async fn test_clear_unknown_watch_is_noop() {
        let fx = fixture();
        let sink = CollectingSink::new();
        fx.coordinator.add_watch("live", sink.clone()).unwrap();

        fx.coordinator.clear_watch("unknown-id");

        assert_eq!(fx.coordinator.active_watches(), 1);
        fx.provider.push_update(sample_aged(0));
        settle().await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_receives_every_update_until_cleared() {
        let fx = fixture();
        let sink = CollectingSink::new();
        fx.coordinator.add_watch("w1", sink.clone()).unwrap();

        fx.provider.push_update(sample_aged(0));
        fx.provider.push_update(sample_aged(0));
        settle().await;
        assert_eq!(sink.len(), 2);
        assert!(sink
            .deliveries()
            .iter()
            .all(|d| matches!(d, Delivery::Sample { keep_open: true, .. })));

        fx.coordinator.clear_watch("w1");
        fx.provider.push_update(sample_aged(0));
        settle().await;
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_deliveries_preserve_provider_order() {
        let fx = fixture();
        let sink = CollectingSink::new();
        fx.coordinator.add_watch("w1", sink.clone()).unwrap();

        for ts in [1_000, 2_000, 3_000, 4_000] {
            fx.provider
                .push_update(LocationSample::new(1.0, 2.0, 10.0, ts));
        }
        settle().await;

        let stamps: Vec<i64> = sink
            .deliveries()
            .iter()
            .filter_map(|d| d.sample().map(|s| s.timestamp_ms))
            .collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Provider errors
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_provider_error_terminates_one_shots_spares_watches() {
        let fx = fixture();

        let one_shot_sinks: Vec<_> = (0..3)
            .map(|i| {
                let sink = CollectingSink::new();
                fx.coordinator.request_once(
                    OneShotOptions::default().with_caller_id(format!("os-{i}")),
                    sink.clone(),
                );
                sink
            })
            .collect();
        let watch_sink = CollectingSink::new();
        fx.coordinator.add_watch("w1", watch_sink.clone()).unwrap();

        fx.provider
            .push_error(FailureKind::ProviderUnavailable, "fix lost");
        settle().await;

        for sink in &one_shot_sinks {
            assert_eq!(sink.len(), 1);
            assert_eq!(
                sink.deliveries()[0].failure().unwrap().kind,
                FailureKind::ProviderUnavailable
            );
        }
        // Watches ride out transient provider errors untouched.
        assert!(watch_sink.is_empty());
        assert_eq!(fx.coordinator.active_watches(), 1);
        assert_eq!(fx.coordinator.pending_one_shots(), 0);

        // And the surviving watch still receives later fixes.
        fx.provider.push_update(sample_aged(0));
        settle().await;
        assert_eq!(watch_sink.len(), 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timeouts
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_delivers_exactly_one_timeout() {
        let fx = fixture();
        let sink = CollectingSink::new();
        fx.coordinator.request_once(
            OneShotOptions::default().with_deadline(Duration::from_secs(5)),
            sink.clone(),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(
            sink.deliveries()[0].failure().unwrap().kind,
            FailureKind::Timeout
        );
        assert_eq!(fx.coordinator.pending_one_shots(), 0);

        // A later fix must not re-deliver to the expired request.
        fx.provider.push_update(sample_aged(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_before_deadline_wins_the_race() {
        let fx = fixture();
        let sink = CollectingSink::new();
        fx.coordinator.request_once(
            OneShotOptions::default().with_deadline(Duration::from_secs(5)),
            sink.clone(),
        );

        fx.provider.push_update(sample_aged(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.len(), 1);
        assert!(sink.deliveries()[0].sample().is_some());

        // Past the would-be deadline: the aborted timer stays silent.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_default_deadline_is_unbounded() {
        let fx = fixture();
        let sink = CollectingSink::new();
        let ticket = fx
            .coordinator
            .request_once(OneShotOptions::default(), sink.clone());
        assert!(ticket.is_pending());
        settle().await;
        // No timer was scheduled; the request simply waits.
        assert_eq!(fx.coordinator.pending_one_shots(), 1);
        assert!(sink.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission grant flow
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_grant_result_acknowledges_waiters_on_full_grant() {
        let fx = fixture();
        fx.gate.set_granted(false);

        let sink = CollectingSink::new();
        fx.coordinator
            .request_once(OneShotOptions::default(), sink.clone());
        assert_eq!(sink.len(), 1); // immediate PermissionUnavailable

        fx.gate.set_granted(true);
        fx.coordinator.on_permission_result(&[true, true]);

        let seen = sink.deliveries();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Delivery::Ack);
    }

    #[tokio::test]
    async fn test_grant_result_single_denial_fails_waiters() {
        let fx = fixture();
        fx.gate.set_granted(false);

        let sink = CollectingSink::new();
        fx.coordinator
            .request_once(OneShotOptions::default(), sink.clone());

        fx.coordinator.on_permission_result(&[true, false]);

        let seen = sink.deliveries();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1].failure().unwrap().kind,
            FailureKind::PermissionUnavailable
        );

        // Waiters are drained; a second result has no one to notify.
        fx.coordinator.on_permission_result(&[true, true]);
        assert_eq!(sink.len(), 2);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_cancels_silently_and_is_idempotent() {
        let fx = fixture();
        let one_shot_sink = CollectingSink::new();
        let watch_sink = CollectingSink::new();
        fx.coordinator
            .request_once(OneShotOptions::default(), one_shot_sink.clone());
        fx.coordinator.add_watch("w1", watch_sink.clone()).unwrap();

        fx.coordinator.shutdown();
        fx.coordinator.shutdown();

        // Cancelled is silent: no wire delivery for either request kind.
        assert!(one_shot_sink.is_empty());
        assert!(watch_sink.is_empty());
        assert_eq!(fx.coordinator.pending_one_shots(), 0);
        assert_eq!(fx.coordinator.active_watches(), 0);
        assert!(!fx.coordinator.has_subscription());

        // Requests after shutdown are dropped without delivery.
        let late = CollectingSink::new();
        let ticket = fx
            .coordinator
            .request_once(OneShotOptions::default(), late.clone());
        assert!(!ticket.is_pending());
        assert!(late.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscription lifecycle
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_single_subscription_across_many_requests() {
        let fx = fixture();
        for i in 0..4 {
            fx.coordinator
                .add_watch(&format!("w{i}"), CollectingSink::new())
                .unwrap();
            fx.coordinator
                .request_once(OneShotOptions::default(), CollectingSink::new());
        }
        assert_eq!(fx.provider.subscriber_count(), 1);
    }
}
