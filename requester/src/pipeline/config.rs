//! Requester configuration.

use serde::{Deserialize, Serialize};

use crate::events::ActivityStore;

/// Serializable requester settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterConfig {
    /// Subscribe a `LoggingActivityObserver` on construction.
    #[serde(default)]
    pub log_activity: bool,
    /// Subscribe an `ActivityStore` of this capacity on construction.
    #[serde(default)]
    pub max_activity_items: Option<usize>,
}

impl RequesterConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables activity logging.
    #[must_use]
    pub fn with_activity_logging(mut self) -> Self {
        self.log_activity = true;
        self
    }

    /// Enables the activity store.
    #[must_use]
    pub fn with_activity_store(mut self, max_items: usize) -> Self {
        self.max_activity_items = Some(max_items);
        self
    }

    /// Enables the activity store with the default capacity.
    #[must_use]
    pub fn with_default_activity_store(self) -> Self {
        self.with_activity_store(ActivityStore::DEFAULT_MAX_ITEMS)
    }
}
