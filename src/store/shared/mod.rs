//! Registration store shared by several server nodes
//!
//! State lives in an external key-value service (see [`keys`] for the
//! layout). Compound operations follow one pattern: read the keys the
//! outcome depends on, build a [`Transaction`] guarded on exactly those
//! values, commit. A failed guard means another node wrote in between; the
//! operation re-reads and tries again, up to
//! [`StoreConfig::max_transaction_attempts`](crate::store::StoreConfig).
//!
//! The primary record and the endpoint index always change in the same
//! transaction. Expiry claims are guarded on the registration value seen by
//! the sweep, so when several nodes sweep at once exactly one of them removes
//! a given registration.

pub mod backend;
pub(crate) mod keys;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use backend::{Guard, KvBackend, MemoryBackend, Put, Transaction};
#[cfg(feature = "redis-store")]
pub use self::redis::RedisBackend;

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use self::keys::{KeySpace, ObservationIndex};
use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::sweeper::ExpirationSweeper;
use super::{ExpirationListener, ObservationInsert, RegistrationStore};
use crate::observation::{Observation, Token};
use crate::registration::{Deregistration, Registration, RegistrationId, RegistrationUpdate};

fn encode<T: Serialize>(what: &'static str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialization { what, source })
}

fn decode<T: DeserializeOwned>(what: &'static str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|source| StoreError::Serialization { what, source })
}

/// Observations of one registration as read from the backend
struct ObservationSnapshot {
    /// Raw index value, used as the transaction guard
    raw_index: Option<String>,
    index: ObservationIndex,
    observations: Vec<Observation>,
}

/// Registration store backed by a shared key-value service
pub struct SharedRegistrationStore<B: KvBackend> {
    backend: B,
    keys: KeySpace,
    max_attempts: u32,
    sweeper: ExpirationSweeper,
    self_ref: Weak<Self>,
}

impl<B: KvBackend + 'static> SharedRegistrationStore<B> {
    pub fn new(backend: B) -> Arc<Self> {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            backend,
            keys: KeySpace::new(config.key_prefix.clone()),
            max_attempts: config.max_transaction_attempts,
            sweeper: ExpirationSweeper::new(config.cleanup_interval),
            self_ref: self_ref.clone(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one expiration sweep as of `now`
    pub async fn sweep_expired(&self, now: SystemTime) -> StoreResult<usize> {
        self.sweeper.sweep(self, now).await
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }

    async fn read_registration(
        &self,
        id: &RegistrationId,
    ) -> StoreResult<Option<(String, Registration)>> {
        match self.backend.get(&self.keys.registration(id)).await? {
            Some(raw) => {
                let registration = decode("registration", &raw)?;
                Ok(Some((raw, registration)))
            }
            None => Ok(None),
        }
    }

    async fn read_observations(&self, id: &RegistrationId) -> StoreResult<ObservationSnapshot> {
        let raw_index = self.backend.get(&self.keys.observation_index(id)).await?;
        let index: ObservationIndex = match raw_index {
            Some(ref raw) => decode("observation index", raw)?,
            None => ObservationIndex::default(),
        };

        let keys: Vec<String> = index
            .tokens
            .iter()
            .map(|hex| self.keys.observation(id, hex))
            .collect();
        let mut observations = Vec::with_capacity(keys.len());
        for raw in self.backend.get_many(&keys).await?.into_iter().flatten() {
            observations.push(decode::<Observation>("observation", &raw)?);
        }

        Ok(ObservationSnapshot {
            raw_index,
            index,
            observations,
        })
    }

    fn contention(&self, key: String) -> StoreError {
        tracing::warn!(key = %key, attempts = self.max_attempts, "Shared store transaction gave up");
        StoreError::Contention {
            key,
            attempts: self.max_attempts,
        }
    }

    /// Remove `id` and its observations if `predicate` holds for the current record
    async fn remove_where(
        &self,
        id: &RegistrationId,
        predicate: impl Fn(&Registration) -> bool + Send + Sync,
    ) -> StoreResult<Option<Deregistration>> {
        let reg_key = self.keys.registration(id);
        let index_key = self.keys.observation_index(id);

        for _ in 0..self.max_attempts {
            let Some((raw, registration)) = self.read_registration(id).await? else {
                return Ok(None);
            };
            if !predicate(&registration) {
                return Ok(None);
            }

            let endpoint_key = self.keys.endpoint(&registration.endpoint);
            let endpoint_owner = self.backend.get(&endpoint_key).await?;
            let snapshot = self.read_observations(id).await?;

            let mut txn = Transaction::new();
            txn.guard(reg_key.as_str(), Some(raw))
                .guard(index_key.as_str(), snapshot.raw_index.clone())
                .guard(endpoint_key.as_str(), endpoint_owner.clone())
                .delete(reg_key.as_str())
                .delete(index_key.as_str());
            for hex in &snapshot.index.tokens {
                txn.delete(self.keys.observation(id, hex));
            }
            if endpoint_owner.as_deref() == Some(id.as_str()) {
                txn.delete(endpoint_key);
            }

            if self.backend.commit(txn).await? {
                return Ok(Some(Deregistration::new(
                    registration,
                    snapshot.observations,
                )));
            }
            tracing::debug!(registration_id = %id, "Remove conflicted, retrying");
        }

        Err(self.contention(reg_key))
    }
}

#[async_trait]
impl<B: KvBackend + 'static> RegistrationStore for SharedRegistrationStore<B> {
    async fn add_registration(
        &self,
        registration: Registration,
    ) -> StoreResult<Option<Deregistration>> {
        let endpoint_key = self.keys.endpoint(&registration.endpoint);
        let new_key = self.keys.registration(&registration.id);
        let value = encode("registration", &registration)?;

        for _ in 0..self.max_attempts {
            let current_id = self.backend.get(&endpoint_key).await?;

            let mut txn = Transaction::new();
            txn.guard(endpoint_key.as_str(), current_id.clone());

            let mut previous = None;
            if let Some(ref old_id) = current_id {
                let old_id = RegistrationId::new(old_id);
                let old_key = self.keys.registration(&old_id);
                match self.read_registration(&old_id).await? {
                    Some((raw, old)) => {
                        let snapshot = self.read_observations(&old_id).await?;
                        let index_key = self.keys.observation_index(&old_id);
                        txn.guard(old_key.as_str(), Some(raw))
                            .guard(index_key.as_str(), snapshot.raw_index.clone())
                            .delete(old_key)
                            .delete(index_key);
                        for hex in &snapshot.index.tokens {
                            txn.delete(self.keys.observation(&old_id, hex));
                        }
                        previous = Some(Deregistration::new(old, snapshot.observations));
                    }
                    None => {
                        // dangling endpoint index entry
                        txn.guard(old_key, None);
                    }
                }
            }

            if current_id.as_deref() != Some(registration.id.as_str()) {
                let existing = self.read_registration(&registration.id).await?;
                match existing {
                    Some((_, existing)) if existing.endpoint != registration.endpoint => {
                        return Err(StoreError::DuplicateRegistration {
                            id: registration.id,
                            endpoint: existing.endpoint,
                        });
                    }
                    Some((raw, _)) => {
                        txn.guard(new_key.as_str(), Some(raw));
                    }
                    None => {
                        txn.guard(new_key.as_str(), None);
                    }
                }
            }

            txn.put(new_key.as_str(), value.as_str())
                .put(endpoint_key.as_str(), registration.id.as_str());

            if self.backend.commit(txn).await? {
                return Ok(previous);
            }
            tracing::debug!(
                endpoint = %registration.endpoint,
                "Registration conflicted with a concurrent writer, retrying"
            );
        }

        Err(self.contention(endpoint_key))
    }

    async fn update_registration(
        &self,
        update: RegistrationUpdate,
    ) -> StoreResult<Option<Registration>> {
        let key = self.keys.registration(&update.registration_id);

        for _ in 0..self.max_attempts {
            let Some((raw, current)) = self.read_registration(&update.registration_id).await?
            else {
                return Ok(None);
            };
            let updated = update.apply(&current, SystemTime::now());

            let mut txn = Transaction::new();
            txn.guard(key.as_str(), Some(raw))
                .put(key.as_str(), encode("registration", &updated)?);

            if self.backend.commit(txn).await? {
                return Ok(Some(updated));
            }
        }

        Err(self.contention(key))
    }

    async fn remove_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Deregistration>> {
        self.remove_where(registration_id, |_| true).await
    }

    async fn get_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Registration>> {
        Ok(self
            .read_registration(registration_id)
            .await?
            .map(|(_, registration)| registration))
    }

    async fn get_registration_by_endpoint(
        &self,
        endpoint: &str,
    ) -> StoreResult<Option<Registration>> {
        let Some(id) = self.backend.get(&self.keys.endpoint(endpoint)).await? else {
            return Ok(None);
        };
        let registration = self.get_registration(&RegistrationId::new(id)).await?;
        Ok(registration.filter(|r| r.endpoint == endpoint))
    }

    async fn all_registrations(&self) -> StoreResult<Vec<Registration>> {
        let keys = self.backend.scan_prefix(&self.keys.registrations()).await?;
        let mut registrations = Vec::with_capacity(keys.len());
        // a key may vanish between scan and read
        for raw in self.backend.get_many(&keys).await?.into_iter().flatten() {
            registrations.push(decode::<Registration>("registration", &raw)?);
        }
        Ok(registrations)
    }

    async fn add_observation(
        &self,
        registration_id: &RegistrationId,
        observation: Observation,
    ) -> StoreResult<Option<ObservationInsert>> {
        let reg_key = self.keys.registration(registration_id);
        let index_key = self.keys.observation_index(registration_id);
        let token_hex = observation.id.to_hex();

        for _ in 0..self.max_attempts {
            let Some((raw, _)) = self.read_registration(registration_id).await? else {
                return Ok(None);
            };
            let snapshot = self.read_observations(registration_id).await?;

            let mut index = snapshot.index;
            index.next_sequence += 1;

            let mut stored = observation.clone();
            stored.registration_id = registration_id.clone();
            stored.sequence = index.next_sequence;

            let superseded: Vec<Observation> = snapshot
                .observations
                .into_iter()
                .filter(|o| o.path == stored.path && o.id != stored.id)
                .collect();

            let mut txn = Transaction::new();
            txn.guard(reg_key.as_str(), Some(raw))
                .guard(index_key.as_str(), snapshot.raw_index);
            for old in &superseded {
                let hex = old.id.to_hex();
                txn.delete(self.keys.observation(registration_id, &hex));
                index.tokens.remove(&hex);
            }
            index.tokens.insert(token_hex.clone());
            txn.put(
                self.keys.observation(registration_id, &token_hex),
                encode("observation", &stored)?,
            )
            .put(index_key.as_str(), encode("observation index", &index)?);

            if self.backend.commit(txn).await? {
                return Ok(Some(ObservationInsert {
                    observation: stored,
                    superseded,
                }));
            }
            tracing::debug!(
                registration_id = %registration_id,
                token = %observation.id,
                "Observation insert conflicted, retrying"
            );
        }

        Err(self.contention(index_key))
    }

    async fn remove_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        let index_key = self.keys.observation_index(registration_id);
        let obs_key = self.keys.observation_for(registration_id, token);
        let hex = token.to_hex();

        for _ in 0..self.max_attempts {
            let raw_index = self.backend.get(&index_key).await?;
            let Some(ref raw) = raw_index else {
                return Ok(None);
            };
            let mut index: ObservationIndex = decode("observation index", raw)?;
            if !index.tokens.remove(&hex) {
                return Ok(None);
            }
            let observation = match self.backend.get(&obs_key).await? {
                Some(raw) => Some(decode::<Observation>("observation", &raw)?),
                None => None,
            };

            let mut txn = Transaction::new();
            txn.guard(index_key.as_str(), raw_index.clone())
                .delete(obs_key.as_str())
                .put(index_key.as_str(), encode("observation index", &index)?);

            if self.backend.commit(txn).await? {
                return Ok(observation);
            }
        }

        Err(self.contention(index_key))
    }

    async fn remove_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        let index_key = self.keys.observation_index(registration_id);

        for _ in 0..self.max_attempts {
            let snapshot = self.read_observations(registration_id).await?;
            if snapshot.index.tokens.is_empty() {
                return Ok(Vec::new());
            }

            let mut index = snapshot.index;
            let mut txn = Transaction::new();
            txn.guard(index_key.as_str(), snapshot.raw_index);
            for hex in &index.tokens {
                txn.delete(self.keys.observation(registration_id, hex));
            }
            index.tokens.clear();
            txn.put(index_key.as_str(), encode("observation index", &index)?);

            if self.backend.commit(txn).await? {
                return Ok(snapshot.observations);
            }
        }

        Err(self.contention(index_key))
    }

    async fn get_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        match self
            .backend
            .get(&self.keys.observation_for(registration_id, token))
            .await?
        {
            Some(raw) => Ok(Some(decode("observation", &raw)?)),
            None => Ok(None),
        }
    }

    async fn get_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        Ok(self.read_observations(registration_id).await?.observations)
    }

    async fn remove_expired(
        &self,
        registration_id: &RegistrationId,
        now: SystemTime,
    ) -> StoreResult<Option<Deregistration>> {
        self.remove_where(registration_id, |r| !r.is_alive_at(now))
            .await
    }

    fn set_expiration_listener(&self, listener: Arc<dyn ExpirationListener>) {
        self.sweeper.set_listener(listener);
    }

    fn start(&self) {
        self.sweeper.start(self.self_ref.clone());
    }

    fn stop(&self) {
        self.sweeper.stop();
    }
}
