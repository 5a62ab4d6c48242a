//! Registry error types

use crate::registration::RegistrationId;
use crate::store::StoreError;

/// Error type for client registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required argument was empty or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Deregistration of an id the store does not know
    #[error("unknown registration: {0}")]
    UnknownRegistration(RegistrationId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
