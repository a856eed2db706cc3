//! GeoFix — location request coordination over an asynchronous provider.
//!
//! Bridges an application's request layer to a shared location-sensing
//! provider: many independent callers can ask "where am I" (one-shot) or
//! "tell me whenever I move" (watch) without managing provider wiring,
//! permission checks, or timeouts themselves.
//!
//! The core is [`coordinator::LocationRequestCoordinator`]; everything
//! else is a thin adapter around it:
//!
//! - [`sample`] — the immutable [`LocationSample`](sample::LocationSample) fix
//! - [`outcome`] — the delivery failure taxonomy (wire codes 1/2/3)
//! - [`sink`] — per-request delivery targets
//! - [`provider`] — the provider trait and a simulated implementation
//! - [`permission`] — the location capability gate
//! - [`bridge`] — the named-action command surface and wire payloads
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use geofix::config::CoordinatorConfig;
//! use geofix::coordinator::{LocationRequestCoordinator, OneShotOptions};
//! use geofix::permission::StaticPermissionGate;
//! use geofix::provider::SimulatedProvider;
//! use geofix::sink::ChannelSink;
//!
//! let provider = Arc::new(SimulatedProvider::new());
//! let gate = Arc::new(StaticPermissionGate::new(true));
//! let coordinator = LocationRequestCoordinator::new(
//!     provider.clone(),
//!     gate,
//!     CoordinatorConfig::default(),
//! );
//!
//! let (sink, mut rx) = ChannelSink::new();
//! coordinator.request_once(
//!     OneShotOptions::default().with_max_age(Duration::from_secs(5)),
//!     sink,
//! );
//! // await rx.recv() for the fix or failure
//! ```

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod outcome;
pub mod permission;
pub mod provider;
pub mod sample;
pub mod sink;

pub use config::CoordinatorConfig;
pub use coordinator::{LocationRequestCoordinator, OneShotOptions, OneShotTicket};
pub use outcome::{CoordinatorError, Failure, FailureKind};
pub use sample::LocationSample;
pub use sink::{ChannelSink, CollectingSink, Delivery, ResultSink, SinkHandle};
