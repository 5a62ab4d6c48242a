//! Shared helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use lwm2m_registry::model::{
    ContentFormat, InvalidValue, Node, NodeDecoder, ObjectModel, TimestampedNode, Value,
};
use lwm2m_registry::observation::ObserveResponse;
use lwm2m_registry::store::{ExpirationListener, ObservationInsert, StoreResult};
use lwm2m_registry::{
    Deregistration, InMemoryRegistrationStore, Observation, ObservationListener, Registration,
    RegistrationId, RegistrationListener, RegistrationStore, RegistrationUpdate, ResourcePath,
    Token,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn address() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
}

pub fn registration(id: &str, endpoint: &str, lifetime: u64) -> Registration {
    Registration::builder(RegistrationId::new(id), endpoint, address())
        .lifetime(lifetime)
        .build()
}

pub fn observation(token: &'static [u8], registration_id: &str, path: &str) -> Observation {
    Observation::new(
        Token::from_static(token),
        RegistrationId::new(registration_id),
        path.parse::<ResourcePath>().unwrap(),
    )
}

/// Lifecycle events, in the order they were delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Registered(RegistrationId),
    Updated(RegistrationId),
    Unregistered(RegistrationId),
}

#[derive(Default)]
pub struct LifecycleRecorder(Mutex<Vec<Lifecycle>>);

impl LifecycleRecorder {
    pub fn events(&self) -> Vec<Lifecycle> {
        self.0.lock().clone()
    }

    pub fn unregistered(&self) -> Vec<RegistrationId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Lifecycle::Unregistered(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl RegistrationListener for LifecycleRecorder {
    fn registered(&self, registration: &Registration) {
        self.0
            .lock()
            .push(Lifecycle::Registered(registration.id.clone()));
    }

    fn updated(&self, _update: &RegistrationUpdate, registration: &Registration) {
        self.0.lock().push(Lifecycle::Updated(registration.id.clone()));
    }

    fn unregistered(&self, registration: &Registration, _observations: &[Observation]) {
        self.0
            .lock()
            .push(Lifecycle::Unregistered(registration.id.clone()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationEvent {
    New(Token),
    Cancelled(Token),
    Value(Token, Option<Value>),
}

#[derive(Default)]
pub struct ObservationRecorder(Mutex<Vec<ObservationEvent>>);

impl ObservationRecorder {
    pub fn events(&self) -> Vec<ObservationEvent> {
        self.0.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<Token> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservationEvent::Cancelled(token) => Some(token),
                _ => None,
            })
            .collect()
    }
}

impl ObservationListener for ObservationRecorder {
    fn new_observation(&self, observation: &Observation) {
        self.0
            .lock()
            .push(ObservationEvent::New(observation.id.clone()));
    }

    fn cancelled(&self, observation: &Observation) {
        self.0
            .lock()
            .push(ObservationEvent::Cancelled(observation.id.clone()));
    }

    fn new_value(&self, observation: &Observation, response: &ObserveResponse) {
        self.0.lock().push(ObservationEvent::Value(
            observation.id.clone(),
            response.node().and_then(|n| n.value()).cloned(),
        ));
    }
}

/// Decodes plain-text integers
pub struct TextDecoder;

impl NodeDecoder for TextDecoder {
    fn decode_timestamped(
        &self,
        payload: &Bytes,
        _format: Option<ContentFormat>,
        path: &ResourcePath,
        _model: &ObjectModel,
    ) -> Result<Vec<TimestampedNode>, InvalidValue> {
        let value = std::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| InvalidValue::new("expected an integer", *path))?;
        Ok(vec![TimestampedNode::untimestamped(Node::single(
            *path,
            Value::Integer(value),
        ))])
    }
}

pub fn decoder() -> Arc<dyn NodeDecoder> {
    Arc::new(TextDecoder)
}

/// In-process store that hands control back to the runtime at chosen points
///
/// Lets two operations joined on one task interleave between the store
/// write and the listener callbacks that follow it.
pub struct YieldingStore {
    inner: Arc<InMemoryRegistrationStore>,
    slow_registration: Option<RegistrationId>,
    slow_observation: Option<Token>,
    slow_scans: bool,
}

impl YieldingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRegistrationStore::new(),
            slow_registration: None,
            slow_observation: None,
            slow_scans: false,
        }
    }

    /// Yield after storing this registration
    pub fn slow_registration(mut self, id: &str) -> Self {
        self.slow_registration = Some(RegistrationId::new(id));
        self
    }

    /// Yield after storing the observation with this token
    pub fn slow_observation(mut self, token: &'static [u8]) -> Self {
        self.slow_observation = Some(Token::from_static(token));
        self
    }

    /// Yield before every `get_observations`
    pub fn slow_scans(mut self) -> Self {
        self.slow_scans = true;
        self
    }
}

#[async_trait]
impl RegistrationStore for YieldingStore {
    async fn add_registration(
        &self,
        registration: Registration,
    ) -> StoreResult<Option<Deregistration>> {
        let slow = self.slow_registration.as_ref() == Some(&registration.id);
        let result = self.inner.add_registration(registration).await;
        if slow {
            tokio::task::yield_now().await;
        }
        result
    }

    async fn update_registration(
        &self,
        update: RegistrationUpdate,
    ) -> StoreResult<Option<Registration>> {
        self.inner.update_registration(update).await
    }

    async fn remove_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Deregistration>> {
        self.inner.remove_registration(registration_id).await
    }

    async fn get_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Option<Registration>> {
        self.inner.get_registration(registration_id).await
    }

    async fn get_registration_by_endpoint(
        &self,
        endpoint: &str,
    ) -> StoreResult<Option<Registration>> {
        self.inner.get_registration_by_endpoint(endpoint).await
    }

    async fn all_registrations(&self) -> StoreResult<Vec<Registration>> {
        self.inner.all_registrations().await
    }

    async fn add_observation(
        &self,
        registration_id: &RegistrationId,
        observation: Observation,
    ) -> StoreResult<Option<ObservationInsert>> {
        let slow = self.slow_observation.as_ref() == Some(&observation.id);
        let result = self.inner.add_observation(registration_id, observation).await;
        if slow {
            tokio::task::yield_now().await;
        }
        result
    }

    async fn remove_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        self.inner.remove_observation(registration_id, token).await
    }

    async fn remove_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        self.inner.remove_observations(registration_id).await
    }

    async fn get_observation(
        &self,
        registration_id: &RegistrationId,
        token: &Token,
    ) -> StoreResult<Option<Observation>> {
        self.inner.get_observation(registration_id, token).await
    }

    async fn get_observations(
        &self,
        registration_id: &RegistrationId,
    ) -> StoreResult<Vec<Observation>> {
        if self.slow_scans {
            tokio::task::yield_now().await;
        }
        self.inner.get_observations(registration_id).await
    }

    async fn remove_expired(
        &self,
        registration_id: &RegistrationId,
        now: SystemTime,
    ) -> StoreResult<Option<Deregistration>> {
        self.inner.remove_expired(registration_id, now).await
    }

    fn set_expiration_listener(&self, listener: Arc<dyn ExpirationListener>) {
        self.inner.set_expiration_listener(listener);
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) {
        self.inner.stop();
    }
}
