//! Coordinator configuration.

use std::time::Duration;

use crate::provider::DEFAULT_PROVIDER;

/// Tunables for [`LocationRequestCoordinator`].
///
/// [`LocationRequestCoordinator`]: crate::coordinator::LocationRequestCoordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Provider name used when a caller does not specify one.
    pub default_provider: String,

    /// Deadline applied to one-shot requests that do not carry their own.
    ///
    /// `None` means one-shot requests never expire once the cache fast
    /// path misses, matching the observed behavior of the platform
    /// adapter this replaces.
    pub default_deadline: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            default_deadline: None,
        }
    }
}
