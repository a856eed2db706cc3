//! Wire payload encoding for the command surface.
//!
//! Field presence is part of the contract, not incidental: `altitude` is
//! null unless the sample reports one, `heading` is null unless both
//! bearing and speed are known, `velocity` and the rest are always
//! present. Failure payloads are `{code, message}` with the conventional
//! 1/2/3 codes.

use serde_json::{json, Value};

use crate::outcome::Failure;
use crate::sample::LocationSample;
use crate::sink::Delivery;

/// One message crossing the boundary back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    /// Success or failure status.
    pub ok: bool,

    /// JSON payload: a sample object, a `{code, message}` object, or null
    /// for a bare acknowledgement.
    pub payload: Value,

    /// Whether the caller-side callback stays registered for further
    /// messages (true for watch deliveries).
    pub keep_callback: bool,
}

/// Encode a successful sample per the presence rules.
pub fn sample_payload(sample: &LocationSample) -> Value {
    json!({
        "latitude": sample.latitude,
        "longitude": sample.longitude,
        "altitude": sample.altitude,
        "accuracy": sample.accuracy,
        "heading": sample.heading(),
        "velocity": sample.velocity(),
        "timestamp": sample.timestamp_ms,
    })
}

/// Encode a failure as `{code, message}`.
pub fn failure_payload(failure: &Failure) -> Value {
    json!({
        "code": failure.kind.code(),
        "message": failure.message,
    })
}

/// Serialize a failure to a JSON string, never losing the signal.
///
/// If serialization of the message content breaks, falls back to a
/// minimal hand-assembled representation with the offending characters
/// replaced, so the caller still receives a parseable `{code, message}`.
pub fn encode_failure(failure: &Failure) -> String {
    match serde_json::to_string(&failure_payload(failure)) {
        Ok(encoded) => encoded,
        Err(_) => {
            let sanitized: String = failure
                .message
                .chars()
                .map(|c| if c == '"' || c == '\\' || c.is_control() { '\'' } else { c })
                .collect();
            format!(
                "{{\"code\":{},\"message\":\"{}\"}}",
                failure.kind.code(),
                sanitized
            )
        }
    }
}

/// Serialize a delivery's boundary message to a JSON string.
///
/// This is the string-boundary entry point: failure deliveries go through
/// [`encode_failure`] so a message that breaks serialization still
/// reaches the caller as parseable JSON.
pub fn encode_delivery(delivery: &Delivery) -> String {
    match delivery {
        Delivery::Failure { failure, keep_open } => format!(
            "{{\"status\":\"error\",\"keepCallback\":{},\"payload\":{}}}",
            keep_open,
            encode_failure(failure)
        ),
        other => {
            let wire = to_wire(other);
            json!({
                "status": "ok",
                "keepCallback": wire.keep_callback,
                "payload": wire.payload,
            })
            .to_string()
        }
    }
}

/// Convert a sink delivery into its boundary message.
pub fn to_wire(delivery: &Delivery) -> WireMessage {
    match delivery {
        Delivery::Sample { sample, keep_open } => WireMessage {
            ok: true,
            payload: sample_payload(sample),
            keep_callback: *keep_open,
        },
        Delivery::Failure { failure, keep_open } => WireMessage {
            ok: false,
            payload: failure_payload(failure),
            keep_callback: *keep_open,
        },
        Delivery::Ack => WireMessage {
            ok: true,
            payload: Value::Null,
            keep_callback: false,
        },
    }
}
