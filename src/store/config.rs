use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Persister calls taking longer fail with `StoreError::Timeout`; their results are
    /// discarded.
    pub operation_timeout: Option<Duration>,
    /// Persister calls taking longer are logged at warn level.
    pub slow_call_threshold: Option<Duration>,
}

impl StoreConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = Some(threshold);
        self
    }
}
