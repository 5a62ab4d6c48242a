//! Store error types

/// Error type for registration store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing key-value service failed or is unreachable
    #[error("store backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded
    #[error("failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The registration id is already in use by another endpoint
    #[error("registration id {id} already belongs to endpoint {endpoint}")]
    DuplicateRegistration {
        id: crate::registration::RegistrationId,
        endpoint: String,
    },

    /// A compound operation kept conflicting with concurrent writers
    #[error("transaction on {key} still conflicting after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
