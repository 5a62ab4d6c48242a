//! Server configuration

use std::fmt;
use std::time::Duration;

use crate::store::{StoreConfig, StoreError};

/// Environment variable selecting the Redis store
pub const ENV_REDIS_URI: &str = "LWM2M_REDIS_URI";

/// Environment variable overriding the sweep interval, in milliseconds
pub const ENV_CLEANUP_INTERVAL_MS: &str = "LWM2M_CLEANUP_INTERVAL_MS";

/// Where registrations are kept
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// In-process store, single node
    #[default]
    InMemory,
    /// Shared store over an in-process backend
    SharedMemory,
    /// Shared store over Redis, for clusters
    Redis { url: String },
}

impl StoreKind {
    /// Whether several server nodes may share this store
    pub fn is_shared(&self) -> bool {
        !matches!(self, StoreKind::InMemory)
    }
}

/// Transport security offered to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    NoSec,
    Psk,
    Rpk,
    X509,
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityMode::NoSec => "NoSec",
            SecurityMode::Psk => "PSK",
            SecurityMode::Rpk => "RPK",
            SecurityMode::X509 => "X509",
        };
        f.write_str(name)
    }
}

/// Configuration errors, reported when the server is built
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested combination is not available in this build or deployment
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// A required collaborator was not provided
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    /// The store backend could not be reached
    #[error("store backend unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Server configuration options
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Registration store selection
    pub store: StoreKind,

    /// Store tuning (sweep interval, transaction attempts, key prefix)
    pub store_config: StoreConfig,

    /// Security mode of the secure endpoint
    pub security: SecurityMode,
}

impl ServerConfig {
    /// Configuration from `LWM2M_REDIS_URI` and `LWM2M_CLEANUP_INTERVAL_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_REDIS_URI).filter(|url| !url.is_empty()) {
            config.store = StoreKind::Redis { url };
        }

        if let Some(value) = lookup(ENV_CLEANUP_INTERVAL_MS) {
            let millis: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_CLEANUP_INTERVAL_MS,
                value: value.clone(),
            })?;
            if millis == 0 {
                return Err(ConfigError::InvalidEnv {
                    name: ENV_CLEANUP_INTERVAL_MS,
                    value,
                });
            }
            config.store_config = config
                .store_config
                .cleanup_interval(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Set the store kind
    pub fn store(mut self, kind: StoreKind) -> Self {
        self.store = kind;
        self
    }

    /// Use a Redis store at `url`
    pub fn redis(self, url: impl Into<String>) -> Self {
        self.store(StoreKind::Redis { url: url.into() })
    }

    /// Set the store tuning
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    /// Set the sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.store_config = self.store_config.cleanup_interval(interval);
        self
    }

    /// Set the security mode
    pub fn security(mut self, mode: SecurityMode) -> Self {
        self.security = mode;
        self
    }

    /// Reject combinations this build cannot serve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_config.cleanup_interval.is_zero() {
            return Err(ConfigError::Unsupported(
                "cleanup interval must be greater than zero".into(),
            ));
        }

        if let StoreKind::Redis { url } = &self.store {
            if !cfg!(feature = "redis-store") {
                return Err(ConfigError::Unsupported(format!(
                    "redis store at {} requires the redis-store feature",
                    url
                )));
            }
        }

        if self.store.is_shared() && matches!(self.security, SecurityMode::Rpk | SecurityMode::X509)
        {
            return Err(ConfigError::Unsupported(format!(
                "{} security is not available with a shared store",
                self.security
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.store, StoreKind::InMemory);
        assert_eq!(config.security, SecurityMode::NoSec);
        assert_eq!(config.store_config.cleanup_interval, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ServerConfig::default()
            .store(StoreKind::SharedMemory)
            .security(SecurityMode::Psk)
            .cleanup_interval(Duration::from_millis(250));

        assert!(config.store.is_shared());
        assert_eq!(config.store_config.cleanup_interval, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_REDIS_URI, "redis://localhost:6379"),
            (ENV_CLEANUP_INTERVAL_MS, "500"),
        ]))
        .unwrap();

        assert_eq!(
            config.store,
            StoreKind::Redis {
                url: "redis://localhost:6379".into()
            }
        );
        assert_eq!(config.store_config.cleanup_interval, Duration::from_millis(500));

        let empty = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(empty.store, StoreKind::InMemory);
    }

    #[test]
    fn test_from_lookup_rejects_bad_interval() {
        for bad in ["soon", "0", "-5"] {
            let result = ServerConfig::from_lookup(lookup(&[(ENV_CLEANUP_INTERVAL_MS, bad)]));
            assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
        }
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let config = ServerConfig::default().cleanup_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Unsupported(_))));
    }

    #[test]
    fn test_certificate_security_needs_local_store() {
        for mode in [SecurityMode::Rpk, SecurityMode::X509] {
            let local = ServerConfig::default().security(mode);
            assert!(local.validate().is_ok());

            let shared = local.store(StoreKind::SharedMemory);
            assert!(matches!(shared.validate(), Err(ConfigError::Unsupported(_))));
        }
    }

    #[cfg(not(feature = "redis-store"))]
    #[test]
    fn test_redis_requires_feature() {
        let config = ServerConfig::default().redis("redis://localhost:6379");
        assert!(matches!(config.validate(), Err(ConfigError::Unsupported(_))));
    }
}
