//! Delivery outcomes and the failure taxonomy.
//!
//! Failures delivered to callers are data, not process faults: the
//! coordinator recovers every provider, permission, and timeout condition
//! into a [`Failure`] and pushes it through the request's sink. The wire
//! codes follow the conventional three-code geolocation error model so
//! callers built against that convention keep working.

use std::fmt;

use thiserror::Error;

/// Why a request failed.
///
/// Cancellation on coordinator shutdown is deliberately absent: cancelled
/// requests are dropped without a wire delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Location capability not granted at admission time.
    PermissionUnavailable,
    /// No enabled provider at admission time, or the provider reported
    /// itself unavailable.
    ProviderUnavailable,
    /// Deadline elapsed before any provider event.
    Timeout,
}

impl FailureKind {
    /// Conventional geolocation wire code (1/2/3).
    pub fn code(self) -> u32 {
        match self {
            FailureKind::PermissionUnavailable => 1,
            FailureKind::ProviderUnavailable => 2,
            FailureKind::Timeout => 3,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::PermissionUnavailable => "permission unavailable",
            FailureKind::ProviderUnavailable => "provider unavailable",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A failure outcome delivered to a request sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable detail for the wire payload.
    pub message: String,
}

impl Failure {
    /// Create a failure with the given kind and message.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Standard failure for a missing location capability.
    pub fn permission_unavailable() -> Self {
        Self::new(
            FailureKind::PermissionUnavailable,
            "Location permission has not been granted.",
        )
    }

    /// Standard failure for a disabled or absent provider.
    pub fn provider_unavailable() -> Self {
        Self::new(
            FailureKind::ProviderUnavailable,
            "No usable location provider is enabled on this device.",
        )
    }

    /// Standard failure for an expired one-shot deadline.
    pub fn timeout() -> Self {
        Self::new(
            FailureKind::Timeout,
            "No location fix arrived before the deadline.",
        )
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {}): {}", self.kind, self.kind.code(), self.message)
    }
}

/// Synchronous coordinator errors.
///
/// Everything else the coordinator can go wrong with is delivered through
/// the request sink as a [`Failure`]; these are the programmer-error cases
/// that must fail the call itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// A watch with this id is already active.
    #[error("watch id {0:?} is already active")]
    DuplicateWatch(String),
}
