//! In-process registration store
//!
//! All state sits behind one `RwLock`; every mutating operation is a single
//! write-lock critical section, which makes each of them atomic with respect
//! to the others.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::sweeper::ExpirationSweeper;
use super::{ExpirationListener, ObservationInsert, RegistrationStore};
use crate::observation::{Observation, Token};
use crate::registration::{Deregistration, Registration, RegistrationId, RegistrationUpdate};

#[derive(Default)]
struct State {
    registrations: HashMap<RegistrationId, Registration>,
    by_endpoint: HashMap<String, RegistrationId>,
    observations: HashMap<RegistrationId, HashMap<Token, Observation>>,
    next_sequence: u64,
}

impl State {
    fn remove(&mut self, registration_id: &RegistrationId) -> Option<Deregistration> {
        let registration = self.registrations.remove(registration_id)?;

        if self.by_endpoint.get(&registration.endpoint) == Some(registration_id) {
            self.by_endpoint.remove(&registration.endpoint);
        }

        let observations = self
            .observations
            .remove(registration_id)
            .map(|m| m.into_values().collect())
            .unwrap_or_default();

        Some(Deregistration::new(registration, observations))
    }
}

/// Registration store for a single server instance
pub struct InMemoryRegistrationStore {
    state: RwLock<State>,
    sweeper: ExpirationSweeper,
    self_ref: Weak<Self>,
}

impl InMemoryRegistrationStore {
    /// Create a store with default configuration
    pub fn new() -> Arc<Self> {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(config: StoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: RwLock::new(State::default()),
            sweeper: ExpirationSweeper::new(config.cleanup_interval),
            self_ref: self_ref.clone(),
        })
    }

    /// Run one expiration sweep as of `now`
    pub async fn sweep_expired(&self, now: SystemTime) -> StoreResult<usize> {
        self.sweeper.sweep(self, now).await
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Number of active registrations
    pub async fn registration_count(&self) -> usize {
        self.state.read().await.registrations.len()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn add_registration(
        &self,
        registration: Registration,
    ) -> StoreResult<Option<Deregistration>> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.registrations.get(&registration.id) {
            if existing.endpoint != registration.endpoint {
                return Err(StoreError::DuplicateRegistration {
                    id: registration.id,
                    endpoint: existing.endpoint.clone(),
                });
            }
        }

        let previous = match state.by_endpoint.get(&registration.endpoint).cloned() {
            Some(previous_id) => state.remove(&previous_id),
            None => None,
        };

        state
            .by_endpoint
            .insert(registration.endpoint.clone(), registration.id.clone());
        state
            .registrations
            .insert(registration.id.clone(), registration);

        Ok(previous)
    }

    async fn update_registration(
        &self,
        update: RegistrationUpdate,
    ) -> StoreResult<Option<Registration>> {
        let mut state = self.state.write().await;

        let Some(current) = state.registrations.get_mut(&update.registration_id) else {
            return Ok(None);
        };
        *current = update.apply(current, SystemTime::now());

        Ok(Some(current.clone()))
    }

    async fn remove_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Deregistration>> {
        Ok(self.state.write().await.remove(registration_id))
    }

    async fn get_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Registration>> {
        Ok(self.state.read().await.registrations.get(registration_id).cloned())
    }

    async fn get_registration_by_endpoint(
        &self,
        endpoint: &str,
    ) -> StoreResult<Option<Registration>> {
        let state = self.state.read().await;
        Ok(state
            .by_endpoint
            .get(endpoint)
            .and_then(|id| state.registrations.get(id))
            .cloned())
    }

    async fn all_registrations(&self) -> StoreResult<Vec<Registration>> {
        Ok(self
            .state
            .read()
            .await
            .registrations
            .values()
            .cloned()
            .collect())
    }

    async fn add_observation(
        &self,
        registration_id: &RegistrationId,
        mut observation: Observation,
    ) -> StoreResult<Option<ObservationInsert>> {
        let mut state = self.state.write().await;

        if !state.registrations.contains_key(registration_id) {
            return Ok(None);
        }

        state.next_sequence += 1;
        observation.sequence = state.next_sequence;
        observation.registration_id = registration_id.clone();

        let observations = state
            .observations
            .entry(registration_id.clone())
            .or_default();

        let superseded_tokens: Vec<Token> = observations
            .values()
            .filter(|o| o.path == observation.path && o.id != observation.id)
            .map(|o| o.id.clone())
            .collect();
        let superseded = superseded_tokens
            .iter()
            .filter_map(|token| observations.remove(token))
            .collect();

        observations.insert(observation.id.clone(), observation.clone());

        Ok(Some(ObservationInsert {
            observation,
            superseded,
        }))
    }

    async fn remove_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        let mut state = self.state.write().await;
        Ok(state
            .observations
            .get_mut(registration_id)
            .and_then(|m| m.remove(token)))
    }

    async fn remove_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        let mut state = self.state.write().await;
        Ok(state
            .observations
            .get_mut(registration_id)
            .map(|m| m.drain().map(|(_, o)| o).collect())
            .unwrap_or_default())
    }

    async fn get_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        let state = self.state.read().await;
        Ok(state
            .observations
            .get(registration_id)
            .and_then(|m| m.get(token))
            .cloned())
    }

    async fn get_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        let state = self.state.read().await;
        Ok(state
            .observations
            .get(registration_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_expired(
        &self,
        registration_id: &RegistrationId,
        now: SystemTime,
    ) -> StoreResult<Option<Deregistration>> {
        let mut state = self.state.write().await;

        let expired = state
            .registrations
            .get(registration_id)
            .is_some_and(|r| !r.is_alive_at(now));
        if !expired {
            return Ok(None);
        }

        Ok(state.remove(registration_id))
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

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::observation::ResourcePath;

    fn registration(id: &str, endpoint: &str) -> Registration {
        Registration::builder(
            RegistrationId::new(id),
            endpoint,
            "127.0.0.1:5683".parse().unwrap(),
        )
        .lifetime(60)
        .build()
    }

    fn observation(token: &'static [u8], reg: &str, path: &str) -> Observation {
        Observation::new(
            Token::from_static(token),
            RegistrationId::new(reg),
            path.parse::<ResourcePath>().unwrap(),
        )
    }

    #[derive(Default)]
    struct RecordingExpiration(Mutex<Vec<(RegistrationId, usize)>>);

    impl ExpirationListener for RecordingExpiration {
        fn registration_expired(&self, registration: &Registration, observations: &[Observation]) {
            self.0
                .lock()
                .unwrap()
                .push((registration.id.clone(), observations.len()));
        }
    }

    #[tokio::test]
    async fn test_add_registration_evicts_same_endpoint() {
        let store = InMemoryRegistrationStore::new();

        let first = assert_ok!(store.add_registration(registration("r1", "dev-1")).await);
        assert!(first.is_none());

        let id = RegistrationId::new("r1");
        assert_ok!(store.add_observation(&id, observation(b"T1", "r1", "/3/0/1")).await);

        let previous = assert_ok!(store.add_registration(registration("r2", "dev-1")).await)
            .expect("previous registration evicted");
        assert_eq!(previous.registration.id, id);
        assert_eq!(previous.observations.len(), 1);

        let current = store.get_registration_by_endpoint("dev-1").await.unwrap().unwrap();
        assert_eq!(current.id, RegistrationId::new("r2"));
        assert!(store.get_registration(&id).await.unwrap().is_none());
        assert!(store.get_observations(&id).await.unwrap().is_empty());
        assert_eq!(store.registration_count().await, 1);
    }

    #[tokio::test]
    async fn test_registration_id_reused_by_other_endpoint() {
        let store = InMemoryRegistrationStore::new();
        store.add_registration(registration("r1", "dev-1")).await.unwrap();

        let result = store.add_registration(registration("r1", "dev-2")).await;
        assert!(matches!(result, Err(StoreError::DuplicateRegistration { .. })));
        assert!(store.get_registration_by_endpoint("dev-2").await.unwrap().is_none());
        assert_eq!(store.registration_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_registration() {
        let store = InMemoryRegistrationStore::new();
        let update = RegistrationUpdate::new(
            RegistrationId::new("missing"),
            "127.0.0.1:5683".parse().unwrap(),
        );

        assert!(store.update_registration(update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_renews_registration() {
        let store = InMemoryRegistrationStore::new();
        let mut reg = registration("r1", "dev-1");
        reg.last_update = SystemTime::UNIX_EPOCH;
        store.add_registration(reg).await.unwrap();

        let update = RegistrationUpdate::new(
            RegistrationId::new("r1"),
            "127.0.0.1:5690".parse().unwrap(),
        )
        .lifetime(300);
        let updated = store.update_registration(update).await.unwrap().unwrap();

        assert_eq!(updated.lifetime, 300);
        assert!(updated.last_update > SystemTime::UNIX_EPOCH);
        assert_eq!(
            store
                .get_registration(&RegistrationId::new("r1"))
                .await
                .unwrap(),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn test_remove_registration_cascades() {
        let store = InMemoryRegistrationStore::new();
        let id = RegistrationId::new("r1");
        store.add_registration(registration("r1", "dev-1")).await.unwrap();
        store
            .add_observation(&id, observation(b"T1", "r1", "/3/0/1"))
            .await
            .unwrap();
        store
            .add_observation(&id, observation(b"T2", "r1", "/3/0/2"))
            .await
            .unwrap();

        let removed = store.remove_registration(&id).await.unwrap().unwrap();
        assert_eq!(removed.observations.len(), 2);
        assert!(store.get_registration_by_endpoint("dev-1").await.unwrap().is_none());
        assert!(store.get_observations(&id).await.unwrap().is_empty());

        // second claim loses
        assert!(store.remove_registration(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_observation_supersedes_same_path() {
        let store = InMemoryRegistrationStore::new();
        let id = RegistrationId::new("r1");
        store.add_registration(registration("r1", "dev-1")).await.unwrap();

        let first = store
            .add_observation(&id, observation(b"T1", "r1", "/3/0/1"))
            .await
            .unwrap()
            .unwrap();
        assert!(first.superseded.is_empty());

        let second = store
            .add_observation(&id, observation(b"T2", "r1", "/3/0/1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.superseded.len(), 1);
        assert_eq!(second.superseded[0].id, Token::from_static(b"T1"));
        assert!(second.observation.sequence > first.observation.sequence);

        let remaining = store.get_observations(&id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, Token::from_static(b"T2"));
    }

    #[tokio::test]
    async fn test_add_observation_unknown_registration() {
        let store = InMemoryRegistrationStore::new();
        let id = RegistrationId::new("ghost");

        let insert = store
            .add_observation(&id, observation(b"T1", "ghost", "/3/0/1"))
            .await
            .unwrap();
        assert!(insert.is_none());
        assert!(store.get_observations(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_observation_idempotent() {
        let store = InMemoryRegistrationStore::new();
        let id = RegistrationId::new("r1");
        let token = Token::from_static(b"T1");
        store.add_registration(registration("r1", "dev-1")).await.unwrap();
        store
            .add_observation(&id, observation(b"T1", "r1", "/3/0/1"))
            .await
            .unwrap();

        assert!(store.remove_observation(&id, &token).await.unwrap().is_some());
        assert!(store.remove_observation(&id, &token).await.unwrap().is_none());
        assert!(store.get_observation(&id, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        crate::init_test_tracing();
        let store = InMemoryRegistrationStore::new();
        let listener = Arc::new(RecordingExpiration::default());
        store.set_expiration_listener(listener.clone());

        let start = SystemTime::now() - Duration::from_secs(120);
        let mut stale = registration("r1", "dev-1");
        stale.last_update = start;
        store.add_registration(stale).await.unwrap();
        store
            .add_observation(
                &RegistrationId::new("r1"),
                observation(b"T1", "r1", "/3/0/1"),
            )
            .await
            .unwrap();
        store.add_registration(registration("r2", "dev-2")).await.unwrap();

        let removed = store.sweep_expired(SystemTime::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            *listener.0.lock().unwrap(),
            vec![(RegistrationId::new("r1"), 1)]
        );

        // nothing left to expire
        assert_eq!(store.sweep_expired(SystemTime::now()).await.unwrap(), 0);
        assert_eq!(listener.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_unbounded_lifetime() {
        let store = InMemoryRegistrationStore::with_config(
            StoreConfig::default().cleanup_interval(Duration::from_millis(20)),
        );
        let forever = Registration::builder(
            RegistrationId::new("r1"),
            "dev-1",
            "127.0.0.1:5683".parse().unwrap(),
        )
        .lifetime(u64::MAX)
        .build();
        store.add_registration(forever).await.unwrap();
        let mut stale = registration("r2", "dev-2");
        stale.last_update = SystemTime::now() - Duration::from_secs(120);
        store.add_registration(stale).await.unwrap();

        assert_eq!(store.sweep_expired(SystemTime::now()).await.unwrap(), 1);
        assert!(store.get_registration(&"r1".into()).await.unwrap().is_some());

        // the background loop survives the same registration
        store.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_sweeping());
        store.stop();
    }

    #[tokio::test]
    async fn test_remove_expired_loses_to_renewal() {
        let store = InMemoryRegistrationStore::new();
        let id = RegistrationId::new("r1");
        let mut reg = registration("r1", "dev-1");
        reg.last_update = SystemTime::now() - Duration::from_secs(120);
        store.add_registration(reg).await.unwrap();

        let update = RegistrationUpdate::new(id.clone(), "127.0.0.1:5683".parse().unwrap());
        store.update_registration(update).await.unwrap();

        assert!(store
            .remove_expired(&id, SystemTime::now())
            .await
            .unwrap()
            .is_none());
        assert!(store.get_registration(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_interval_sweeper_keeps_running() {
        let store = InMemoryRegistrationStore::with_config(
            StoreConfig::default().cleanup_interval(Duration::ZERO),
        );
        store.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.is_sweeping());
        store.stop();
    }

    #[tokio::test]
    async fn test_start_stop_sweeper() {
        let store = InMemoryRegistrationStore::with_config(
            StoreConfig::default().cleanup_interval(Duration::from_millis(50)),
        );
        store.start();
        assert!(store.is_sweeping());
        store.start();
        store.stop();
        assert!(!store.is_sweeping());
    }
}
