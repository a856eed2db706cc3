//! Command bridge — the named-action surface over the coordinator.
//!
//! Maps the three boundary actions onto coordinator calls, using the
//! positional JSON argument conventions of the platform adapter this
//! replaces:
//!
//! - `getLocation(maximumAge millis, provider)` — one result
//! - `addWatch(id)` — deliveries until cleared, tagged keep-callback
//! - `clearWatch(id)` — synchronous acknowledge, always succeeds
//!
//! Everything here is a thin adapter; gating, registration, and routing
//! live in the coordinator.

mod payload;

pub use payload::{
    encode_delivery, encode_failure, failure_payload, sample_payload, to_wire, WireMessage,
};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::coordinator::{LocationRequestCoordinator, OneShotOptions};
use crate::outcome::CoordinatorError;
use crate::sink::{Delivery, SinkHandle};

/// Synchronous bridge errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The action name matched none of the known commands.
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    /// The coordinator rejected the registration.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Dispatches named actions to the coordinator.
pub struct CommandBridge {
    coordinator: Arc<LocationRequestCoordinator>,
}

impl CommandBridge {
    /// Create a bridge over the given coordinator.
    pub fn new(coordinator: Arc<LocationRequestCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Execute one named action.
    ///
    /// `args` is the positional JSON argument array. All asynchronous
    /// outcomes flow through `sink`; the returned `Result` only carries
    /// the synchronous error cases (unknown action, duplicate watch id).
    pub fn execute(&self, action: &str, args: &Value, sink: SinkHandle) -> Result<(), BridgeError> {
        tracing::debug!(action, "dispatching command");
        match action {
            "getLocation" => {
                self.get_location(args, sink);
                Ok(())
            }
            "addWatch" => {
                let id = opt_string(args, 0, "");
                self.coordinator.add_watch(&id, sink)?;
                Ok(())
            }
            "clearWatch" => {
                let id = opt_string(args, 0, "");
                self.coordinator.clear_watch(&id);
                // Best-effort cancel acknowledges unconditionally.
                sink.deliver(Delivery::Ack);
                Ok(())
            }
            other => Err(BridgeError::UnknownAction(other.to_string())),
        }
    }

    fn get_location(&self, args: &Value, sink: SinkHandle) {
        let maximum_age_ms = opt_non_negative_int(args, 0, 0);
        let provider = opt_string(args, 1, crate::provider::DEFAULT_PROVIDER);

        let opts = OneShotOptions::default()
            .with_max_age(Duration::from_millis(maximum_age_ms))
            .with_provider(provider);
        self.coordinator.request_once(opts, sink);
    }
}

/// Positional string argument with a default, platform-adapter style.
fn opt_string(args: &Value, index: usize, default: &str) -> String {
    args.get(index)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Positional non-negative integer argument; malformed or negative values
/// fall back to the default rather than failing the call.
fn opt_non_negative_int(args: &Value, index: usize, default: u64) -> u64 {
    args.get(index)
        .and_then(Value::as_i64)
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}
