//! Location sample value type.
//!
//! A [`LocationSample`] is one fix as reported by the underlying provider.
//! Samples are immutable once produced; the coordinator and bridge only
//! read them.
//!
//! Field presence rules mirror the provider contract:
//! - `altitude` and `bearing` are optional and may be absent on any fix.
//! - `heading` is only meaningful when both bearing and speed are known;
//!   [`LocationSample::heading`] encodes that rule.
//! - `velocity` is always reported, defaulting to `0.0` when the provider
//!   did not measure speed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single immutable location fix.
///
/// Timestamps are wall-clock epoch milliseconds as reported by the
/// provider, which is also the unit callers use for staleness bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Altitude in meters, if the provider reported one.
    pub altitude: Option<f64>,

    /// Horizontal accuracy in meters.
    pub accuracy: f64,

    /// Bearing in degrees (0-360), if the provider reported one.
    pub bearing: Option<f64>,

    /// Ground speed in meters per second, if the provider measured it.
    pub speed: Option<f64>,

    /// Fix time as epoch milliseconds.
    pub timestamp_ms: i64,
}

impl LocationSample {
    /// Create a sample with the required fields; optional fields start empty.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy,
            bearing: None,
            speed: None,
            timestamp_ms,
        }
    }

    /// Set the altitude in meters.
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Set the bearing in degrees.
    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Set the ground speed in meters per second.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Heading in degrees, present only when both bearing and speed are known.
    ///
    /// A bearing without a measured speed is stale rotation data from the
    /// last moving fix and is suppressed rather than reported.
    pub fn heading(&self) -> Option<f64> {
        match (self.bearing, self.speed) {
            (Some(bearing), Some(_)) => Some(bearing),
            _ => None,
        }
    }

    /// Ground speed for the wire payload; `0.0` when not measured.
    pub fn velocity(&self) -> f64 {
        self.speed.unwrap_or(0.0)
    }

    /// Age of this sample relative to `now_ms`.
    ///
    /// A sample timestamped in the future (clock skew between provider and
    /// caller) has age zero.
    pub fn age_at(&self, now_ms: i64) -> Duration {
        let delta = now_ms.saturating_sub(self.timestamp_ms);
        Duration::from_millis(delta.max(0) as u64)
    }

    /// Whether this sample is still usable under the given staleness bound.
    pub fn is_fresh_at(&self, now_ms: i64, max_age: Duration) -> bool {
        self.age_at(now_ms) <= max_age
    }
}

/// Current wall-clock time as epoch milliseconds.
///
/// Single definition so staleness checks and provider timestamps agree on
/// the clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(timestamp_ms: i64) -> LocationSample {
        LocationSample::new(53.5, 9.9, 12.0, timestamp_ms)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Heading presence rule
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_heading_requires_bearing_and_speed() {
        let both = sample_at(0).with_bearing(270.0).with_speed(4.2);
        assert_eq!(both.heading(), Some(270.0));

        let bearing_only = sample_at(0).with_bearing(270.0);
        assert_eq!(bearing_only.heading(), None);

        let speed_only = sample_at(0).with_speed(4.2);
        assert_eq!(speed_only.heading(), None);

        assert_eq!(sample_at(0).heading(), None);
    }

    #[test]
    fn test_velocity_defaults_to_zero() {
        assert_eq!(sample_at(0).velocity(), 0.0);
        assert_eq!(sample_at(0).with_speed(1.5).velocity(), 1.5);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Staleness
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_age_at() {
        let sample = sample_at(10_000);
        assert_eq!(sample.age_at(13_000), Duration::from_millis(3_000));
        assert_eq!(sample.age_at(10_000), Duration::ZERO);
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let sample = sample_at(20_000);
        assert_eq!(sample.age_at(10_000), Duration::ZERO);
        assert!(sample.is_fresh_at(10_000, Duration::ZERO));
    }

    #[test]
    fn test_freshness_boundary_is_inclusive() {
        let sample = sample_at(0);
        assert!(sample.is_fresh_at(5_000, Duration::from_millis(5_000)));
        assert!(!sample.is_fresh_at(5_001, Duration::from_millis(5_000)));
    }
}
