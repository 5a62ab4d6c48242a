//! Observation registry error types

use crate::registry::RegistryError;
use crate::store::StoreError;

/// Error type for observation registry operations
#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result alias for observation registry operations
pub type ObservationResult<T> = Result<T, ObservationError>;
