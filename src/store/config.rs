//! Store configuration

use std::time::Duration;

/// Configuration shared by the store implementations
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How often the sweeper scans for expired registrations
    pub cleanup_interval: Duration,

    /// Optimistic transaction attempts before giving up (shared store)
    pub max_transaction_attempts: u32,

    /// Prefix of every key written to a shared backend
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(2),
            max_transaction_attempts: 16,
            key_prefix: "LWM2M:".to_string(),
        }
    }
}

impl StoreConfig {
    /// Set the sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the maximum number of transaction attempts (at least 1)
    pub fn max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts.max(1);
        self
    }

    /// Set the shared backend key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}
