//! Client registry implementation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{RegistryError, RegistryResult};
use super::listener::RegistrationListener;
use crate::listener::{ListenerId, ListenerSet};
use crate::observation::Observation;
use crate::registration::{Deregistration, Registration, RegistrationId, RegistrationUpdate};
use crate::store::{ExpirationListener, RegistrationStore};

/// Delivers lifecycle events to the registry's listeners
///
/// A registration stored by `register_client` but not yet announced is kept
/// in `pending`. If a concurrent eviction, deregistration or expiry removes
/// it first, its `registered` is emitted ahead of the `unregistered`.
#[derive(Default)]
struct Announcer {
    listeners: ListenerSet<dyn RegistrationListener>,
    pending: Mutex<HashMap<RegistrationId, Registration>>,
}

impl Announcer {
    fn registered(&self, registration: &Registration) {
        let mut pending = self.pending.lock();
        if pending.remove(&registration.id).is_none() {
            return;
        }
        tracing::info!(
            endpoint = %registration.endpoint,
            registration_id = %registration.id,
            address = %registration.address,
            lifetime = registration.lifetime,
            "Client registered"
        );
        self.listeners.for_each(|l| l.registered(registration));
    }

    fn unregistered(&self, registration: &Registration, observations: &[Observation]) {
        let mut pending = self.pending.lock();
        if let Some(unannounced) = pending.remove(&registration.id) {
            self.listeners.for_each(|l| l.registered(&unannounced));
        }
        drop(pending);

        self.replaced(registration, observations);
    }

    /// `unregistered` for a record whose id may be pending again
    fn replaced(&self, registration: &Registration, observations: &[Observation]) {
        self.listeners
            .for_each(|l| l.unregistered(registration, observations));
    }
}

/// Turns store expirations into `unregistered` events
struct ExpirationForwarder {
    announcer: Arc<Announcer>,
}

impl ExpirationListener for ExpirationForwarder {
    fn registration_expired(&self, registration: &Registration, observations: &[Observation]) {
        self.announcer.unregistered(registration, observations);
    }
}

/// Registry of connected clients
///
/// All state lives in the [`RegistrationStore`]; the registry validates
/// arguments, delegates, and tells its listeners what the store did.
pub struct ClientRegistry {
    store: Arc<dyn RegistrationStore>,
    announcer: Arc<Announcer>,
}

impl ClientRegistry {
    /// Create a registry over `store`
    ///
    /// The registry installs itself as the store's expiration listener.
    pub fn new(store: Arc<dyn RegistrationStore>) -> Arc<Self> {
        let announcer = Arc::new(Announcer::default());
        store.set_expiration_listener(Arc::new(ExpirationForwarder {
            announcer: Arc::clone(&announcer),
        }));

        Arc::new(Self { store, announcer })
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId {
        self.announcer.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.announcer.listeners.remove(id)
    }

    /// Register a client, replacing any registration with the same endpoint name
    ///
    /// A replaced registration is announced as `unregistered` before the new
    /// one is announced as `registered`.
    pub async fn register_client(&self, registration: Registration) -> RegistryResult<()> {
        if registration.id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "registration id must not be empty".into(),
            ));
        }
        if registration.endpoint.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "endpoint name must not be empty".into(),
            ));
        }

        self.announcer
            .pending
            .lock()
            .insert(registration.id.clone(), registration.clone());

        let previous = match self.store.add_registration(registration.clone()).await {
            Ok(previous) => previous,
            Err(e) => {
                self.announcer.pending.lock().remove(&registration.id);
                return Err(e.into());
            }
        };

        if let Some(previous) = previous {
            tracing::info!(
                endpoint = %registration.endpoint,
                registration_id = %previous.registration.id,
                replaced_by = %registration.id,
                "Registration replaced"
            );
            if previous.registration.id == registration.id {
                self.announcer
                    .replaced(&previous.registration, &previous.observations);
            } else {
                self.announcer
                    .unregistered(&previous.registration, &previous.observations);
            }
        }

        self.announcer.registered(&registration);

        Ok(())
    }

    /// Apply an update; `None` if the registration no longer exists
    pub async fn update_client(
        &self,
        update: RegistrationUpdate,
    ) -> RegistryResult<Option<Registration>> {
        if update.registration_id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "registration id must not be empty".into(),
            ));
        }

        let Some(updated) = self.store.update_registration(update.clone()).await? else {
            tracing::debug!(
                registration_id = %update.registration_id,
                "Update for unknown registration"
            );
            return Ok(None);
        };

        tracing::debug!(
            endpoint = %updated.endpoint,
            registration_id = %updated.id,
            "Client updated"
        );
        self.announcer
            .listeners
            .for_each(|l| l.updated(&update, &updated));

        Ok(Some(updated))
    }

    /// Deregister a client
    ///
    /// Unlike updates, deregistering an unknown id is an error: callers are
    /// expected to have checked the registration exists.
    pub async fn deregister_client(
        &self,
        registration_id: &RegistrationId,
    ) -> RegistryResult<Deregistration> {
        if registration_id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "registration id must not be empty".into(),
            ));
        }

        let deregistration = self
            .store
            .remove_registration(registration_id)
            .await?
            .ok_or_else(|| RegistryError::UnknownRegistration(registration_id.clone()))?;

        tracing::info!(
            endpoint = %deregistration.registration.endpoint,
            registration_id = %registration_id,
            observations = deregistration.observations.len(),
            "Client deregistered"
        );
        self.announcer
            .unregistered(&deregistration.registration, &deregistration.observations);

        Ok(deregistration)
    }

    pub async fn find_by_registration_id(
        &self,
        registration_id: &RegistrationId,
    ) -> RegistryResult<Option<Registration>> {
        Ok(self.store.get_registration(registration_id).await?)
    }

    /// Current registration of `endpoint`
    pub async fn get(&self, endpoint: &str) -> RegistryResult<Option<Registration>> {
        Ok(self.store.get_registration_by_endpoint(endpoint).await?)
    }

    pub async fn all_clients(&self) -> RegistryResult<Vec<Registration>> {
        Ok(self.store.all_registrations().await?)
    }

    /// Start the store's expiration sweeper
    pub fn start(&self) {
        self.store.start();
    }

    pub fn stop(&self) {
        self.store.stop();
    }
}
