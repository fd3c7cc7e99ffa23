//! Task Queue Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of failure reports retained per queue
pub const DEFAULT_FAILURE_HISTORY: usize = 100;

/// Default drain deadline used by callers that do not pass their own
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Task queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name (appears in logs, metrics labels and failure reports)
    pub name: String,

    /// Number of recent failure reports to retain (0 disables the history)
    pub failure_history: usize,

    /// Drain deadline in seconds used during shutdown
    pub drain_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_history: DEFAULT_FAILURE_HISTORY,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with the given queue name and defaults otherwise
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get the drain deadline
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
