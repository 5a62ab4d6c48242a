//! Registration store
//!
//! The store owns the canonical copy of every registration and observation
//! and is the only place where they are mutated. Each operation is atomic:
//! evicting the previous registration of an endpoint, removing a
//! registration together with its observations, or superseding an
//! observation on the same path all happen as a single claim, so concurrent
//! callers observe a total order per registration.
//!
//! # Implementations
//!
//! ```text
//!                 Arc<dyn RegistrationStore>
//!                 ┌──────────────┴──────────────┐
//!                 ▼                             ▼
//!   InMemoryRegistrationStore      SharedRegistrationStore<B: KvBackend>
//!   (one RwLock, single node)      (guarded transactions, many nodes)
//!                                       ┌───────┴───────┐
//!                                       ▼               ▼
//!                                 MemoryBackend    RedisBackend
//! ```
//!
//! Both own an [`ExpirationSweeper`] that periodically reclaims registrations
//! whose `last_update + lifetime` has passed.

pub mod config;
pub mod error;
pub mod memory;
pub mod shared;
pub mod sweeper;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRegistrationStore;
pub use shared::{KvBackend, MemoryBackend, SharedRegistrationStore, Transaction};
pub use sweeper::ExpirationSweeper;

#[cfg(feature = "redis-store")]
pub use shared::RedisBackend;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::observation::{Observation, Token};
use crate::registration::{Deregistration, Registration, RegistrationId, RegistrationUpdate};

/// Called by the sweeper once per expired registration
pub trait ExpirationListener: Send + Sync {
    fn registration_expired(&self, registration: &Registration, observations: &[Observation]);
}

/// Outcome of persisting an observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationInsert {
    /// The observation as stored, with its sequence assigned
    pub observation: Observation,
    /// Observations on the same path removed by this insert
    pub superseded: Vec<Observation>,
}

/// Storage of registrations and their observations
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a registration, evicting the active one with the same endpoint name
    async fn add_registration(
        &self,
        registration: Registration,
    ) -> StoreResult<Option<Deregistration>>;

    /// Apply an update; `None` if the registration is unknown
    async fn update_registration(
        &self,
        update: RegistrationUpdate,
    ) -> StoreResult<Option<Registration>>;

    /// Remove a registration and all its observations
    async fn remove_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Deregistration>>;

    async fn get_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Registration>>;

    async fn get_registration_by_endpoint(&self, endpoint: &str)
        -> StoreResult<Option<Registration>>;

    async fn all_registrations(&self) -> StoreResult<Vec<Registration>>;

    /// Persist an observation, superseding any other one on the same path
    ///
    /// Returns `None` without persisting anything if the registration is unknown.
    async fn add_observation(
        &self,
        registration_id: &RegistrationId,
        observation: Observation,
    ) -> StoreResult<Option<ObservationInsert>>;

    async fn remove_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>>;

    async fn remove_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>>;

    async fn get_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>>;

    async fn get_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>>;

    /// Remove the registration only if it still exists and is expired at `now`
    async fn remove_expired(
        &self,
        registration_id: &RegistrationId,
        now: SystemTime,
    ) -> StoreResult<Option<Deregistration>>;

    /// Set the single callback invoked for expired registrations
    fn set_expiration_listener(&self, listener: Arc<dyn ExpirationListener>);

    /// Start the expiration sweeper (requires a tokio runtime)
    fn start(&self);

    /// Stop the expiration sweeper
    fn stop(&self);
}
