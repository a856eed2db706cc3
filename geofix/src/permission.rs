//! Permission gate for the location capability set.
//!
//! The adapter declares a fixed capability set (coarse + fine location).
//! [`PermissionGate::has_permission`] is the synchronous admission check;
//! [`PermissionGate::request_grant`] kicks off the platform's external
//! grant flow, whose outcome arrives later through
//! [`LocationRequestCoordinator::on_permission_result`] as an array of
//! per-capability grant booleans.
//!
//! [`LocationRequestCoordinator::on_permission_result`]: crate::coordinator::LocationRequestCoordinator::on_permission_result

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One platform capability the adapter may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Approximate (network-level) location.
    CoarseLocation,
    /// Precise (GPS-level) location.
    FineLocation,
}

/// The fixed capability set every request is gated on.
pub const REQUIRED_CAPABILITIES: &[Capability] =
    &[Capability::CoarseLocation, Capability::FineLocation];

/// Answers whether the caller currently holds the location capability and
/// triggers the external grant flow when it does not.
pub trait PermissionGate: Send + Sync {
    /// Whether every capability in [`REQUIRED_CAPABILITIES`] is granted.
    ///
    /// Queried fresh at every admission; grants can be revoked between
    /// calls.
    fn has_permission(&self) -> bool;

    /// Start the external grant flow.
    ///
    /// Fire-and-forget: the outcome is reported asynchronously via the
    /// coordinator's grant-result entry point, never through this trait.
    fn request_grant(&self);
}

/// In-process gate for tests and the CLI demo.
pub struct StaticPermissionGate {
    granted: AtomicBool,
    grant_requests: AtomicUsize,
}

impl StaticPermissionGate {
    /// Create a gate with the given initial grant state.
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            grant_requests: AtomicUsize::new(0),
        }
    }

    /// Flip the grant state (simulates the user answering the dialog).
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// How many times the grant flow has been triggered.
    pub fn grant_requests(&self) -> usize {
        self.grant_requests.load(Ordering::SeqCst)
    }
}

impl PermissionGate for StaticPermissionGate {
    fn has_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_grant(&self) {
        self.grant_requests.fetch_add(1, Ordering::SeqCst);
    }
}
