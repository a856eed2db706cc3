//! Pending-request registry.
//!
//! The one shared mutable structure in the coordinator. Every mutation
//! (register, terminate-on-delivery, terminate-on-timeout, cancel) happens
//! under the coordinator's single mutex; this module only defines the data
//! and the mutations, never performs delivery, and never blocks.
//!
//! One-shot ids and watch ids are independent namespaces: one-shots are
//! keyed by an internal sequence number (the caller-supplied id is carried
//! for logging only), watches by their caller-supplied id string.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::outcome::CoordinatorError;
use crate::sink::SinkHandle;

/// A registered one-shot request awaiting its first provider event.
pub(super) struct OneShotEntry {
    /// Caller-supplied id, possibly empty; carried for logging.
    pub caller_id: String,

    /// Delivery target for this request.
    pub sink: SinkHandle,

    /// Scheduled expiry task, present only for finite deadlines.
    pub timeout: Option<JoinHandle<()>>,
}

impl OneShotEntry {
    /// Cancel the expiry task, if one was scheduled.
    ///
    /// Safe against the race where the timer already fired: the timer
    /// removes the entry itself before delivering, so an entry obtained
    /// from the registry can only abort a timer that has not yet won.
    pub fn abort_timeout(&mut self) {
        if let Some(handle) = self.timeout.take() {
            handle.abort();
        }
    }
}

/// An active watch.
pub(super) struct WatchEntry {
    /// Delivery target for every subsequent fix.
    pub sink: SinkHandle,
}

/// Registry of all pending requests plus subscription state.
#[derive(Default)]
pub(super) struct Registry {
    one_shots: HashMap<u64, OneShotEntry>,
    watches: HashMap<String, WatchEntry>,
    grant_waiters: Vec<SinkHandle>,
    next_seq: u64,

    /// Provider subscription pump. `Some` iff the single subscription is
    /// live; enforces the at-most-one-subscription invariant.
    pub pump: Option<JoinHandle<()>>,

    /// Set once by `shutdown`; admissions after this are dropped.
    pub shut_down: bool,
}

impl Registry {
    /// Register a one-shot request, returning its sequence number.
    pub fn insert_one_shot(&mut self, caller_id: String, sink: SinkHandle) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.one_shots.insert(
            seq,
            OneShotEntry {
                caller_id,
                sink,
                timeout: None,
            },
        );
        seq
    }

    /// Remove a one-shot request by sequence number.
    ///
    /// Returns `None` when the request already terminated; the caller
    /// treats that as a no-op, which is what makes delivery/timeout races
    /// at-most-once.
    pub fn remove_one_shot(&mut self, seq: u64) -> Option<OneShotEntry> {
        self.one_shots.remove(&seq)
    }

    /// Attach a scheduled expiry task to a still-pending one-shot.
    ///
    /// Hands the task back when the request already terminated so the
    /// caller can abort it.
    pub fn attach_timeout(
        &mut self,
        seq: u64,
        handle: JoinHandle<()>,
    ) -> Result<(), JoinHandle<()>> {
        match self.one_shots.get_mut(&seq) {
            Some(entry) => {
                entry.timeout = Some(handle);
                Ok(())
            }
            None => Err(handle),
        }
    }

    /// Remove and return every pending one-shot (delivery or shutdown).
    pub fn drain_one_shots(&mut self) -> Vec<OneShotEntry> {
        self.one_shots.drain().map(|(_, entry)| entry).collect()
    }

    /// Register a watch under its caller-supplied id.
    pub fn insert_watch(&mut self, id: &str, sink: SinkHandle) -> Result<(), CoordinatorError> {
        if self.watches.contains_key(id) {
            return Err(CoordinatorError::DuplicateWatch(id.to_string()));
        }
        self.watches.insert(id.to_string(), WatchEntry { sink });
        Ok(())
    }

    /// Whether a watch is active under this id.
    pub fn contains_watch(&self, id: &str) -> bool {
        self.watches.contains_key(id)
    }

    /// Remove a watch; unknown ids are a no-op.
    pub fn remove_watch(&mut self, id: &str) -> Option<WatchEntry> {
        self.watches.remove(id)
    }

    /// Remove and return every active watch (shutdown only).
    pub fn drain_watches(&mut self) -> Vec<WatchEntry> {
        self.watches.drain().map(|(_, entry)| entry).collect()
    }

    /// Snapshot the sinks of all active watches for fan-out delivery.
    pub fn watch_sinks(&self) -> Vec<SinkHandle> {
        self.watches
            .values()
            .map(|entry| entry.sink.clone())
            .collect()
    }

    /// Register a sink awaiting the outcome of the external grant flow.
    pub fn push_grant_waiter(&mut self, sink: SinkHandle) {
        self.grant_waiters.push(sink);
    }

    /// Take every registered grant waiter.
    pub fn drain_grant_waiters(&mut self) -> Vec<SinkHandle> {
        std::mem::take(&mut self.grant_waiters)
    }

    pub fn one_shot_count(&self) -> usize {
        self.one_shots.len()
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;

    fn sink() -> SinkHandle {
        CollectingSink::new()
    }

    #[test]
    fn test_one_shot_sequence_numbers_are_unique() {
        let mut reg = Registry::default();
        let a = reg.insert_one_shot(String::new(), sink());
        let b = reg.insert_one_shot(String::new(), sink());
        assert_ne!(a, b);
        assert_eq!(reg.one_shot_count(), 2);
    }

    #[test]
    fn test_remove_one_shot_is_at_most_once() {
        let mut reg = Registry::default();
        let seq = reg.insert_one_shot("caller".into(), sink());
        assert!(reg.remove_one_shot(seq).is_some());
        assert!(reg.remove_one_shot(seq).is_none());
    }

    #[test]
    fn test_duplicate_watch_id_rejected() {
        let mut reg = Registry::default();
        reg.insert_watch("w1", sink()).unwrap();
        let err = reg.insert_watch("w1", sink()).unwrap_err();
        assert_eq!(err, CoordinatorError::DuplicateWatch("w1".into()));
    }

    #[test]
    fn test_watch_id_free_after_removal() {
        let mut reg = Registry::default();
        reg.insert_watch("w1", sink()).unwrap();
        assert!(reg.remove_watch("w1").is_some());
        assert!(reg.insert_watch("w1", sink()).is_ok());
    }

    #[test]
    fn test_one_shot_and_watch_ids_do_not_collide() {
        // Same string as one-shot caller id and watch id; independent
        // namespaces mean neither registration disturbs the other.
        let mut reg = Registry::default();
        reg.insert_one_shot("shared-id".into(), sink());
        reg.insert_watch("shared-id", sink()).unwrap();
        assert_eq!(reg.one_shot_count(), 1);
        assert_eq!(reg.watch_count(), 1);
    }

    #[test]
    fn test_drain_grant_waiters_empties_the_list() {
        let mut reg = Registry::default();
        reg.push_grant_waiter(sink());
        reg.push_grant_waiter(sink());
        assert_eq!(reg.drain_grant_waiters().len(), 2);
        assert!(reg.drain_grant_waiters().is_empty());
    }
}
