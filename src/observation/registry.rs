//! Observation registry implementation

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::error::ObservationResult;
use super::listener::ObservationListener;
use super::notification::{NotificationRequest, NotificationResponse, ObserveResponse};
use super::path::ResourcePath;
use super::record::{Observation, Token};
use crate::endpoint::ObservationEndpoint;
use crate::listener::{ListenerId, ListenerSet};
use crate::model::{ModelProvider, NodeDecoder};
use crate::registration::{Registration, RegistrationId};
use crate::registry::{ClientRegistry, RegistrationListener};
use crate::store::RegistrationStore;

type EndpointSlot = RwLock<Option<Arc<dyn ObservationEndpoint>>>;

/// Observations stored by an `add_observation` still to be announced
type Pending = HashSet<(RegistrationId, Token)>;

/// Emits `cancelled` for observations removed together with their registration
struct CascadeListener {
    registry: Weak<ObservationRegistry>,
}

impl RegistrationListener for CascadeListener {
    fn unregistered(&self, _registration: &Registration, observations: &[Observation]) {
        if let Some(registry) = self.registry.upgrade() {
            for observation in observations {
                registry.observation_removed(observation);
            }
        }
    }
}

/// Registry of active observations and bridge for their notifications
pub struct ObservationRegistry {
    store: Arc<dyn RegistrationStore>,
    clients: Arc<ClientRegistry>,
    model_provider: Arc<dyn ModelProvider>,
    decoder: Arc<dyn NodeDecoder>,
    secure_endpoint: EndpointSlot,
    non_secure_endpoint: EndpointSlot,
    listeners: ListenerSet<dyn ObservationListener>,
    /// Held while announcing, so `new_observation` for a token always
    /// precedes its `cancelled`
    pending: Mutex<Pending>,
    cascade_listener: ListenerId,
}

impl ObservationRegistry {
    /// Create a registry over `store`
    ///
    /// `clients` must wrap the same store. The registry subscribes to it to
    /// report observations removed by deregistrations and expirations.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        clients: Arc<ClientRegistry>,
        model_provider: Arc<dyn ModelProvider>,
        decoder: Arc<dyn NodeDecoder>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|registry| {
            let cascade_listener = clients.add_listener(Arc::new(CascadeListener {
                registry: registry.clone(),
            }));
            Self {
                store,
                clients,
                model_provider,
                decoder,
                secure_endpoint: RwLock::new(None),
                non_secure_endpoint: RwLock::new(None),
                listeners: ListenerSet::new(),
                pending: Mutex::new(Pending::new()),
                cascade_listener,
            }
        })
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    pub fn set_secure_endpoint(&self, endpoint: Arc<dyn ObservationEndpoint>) {
        *self.secure_endpoint.write() = Some(endpoint);
    }

    pub fn set_non_secure_endpoint(&self, endpoint: Arc<dyn ObservationEndpoint>) {
        *self.non_secure_endpoint.write() = Some(endpoint);
    }

    pub fn add_listener(&self, listener: Arc<dyn ObservationListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Record a new observation and cancel older ones on the same path
    ///
    /// Persisting is an idempotent upsert, so it is safe to call after the
    /// protocol layer stored the observation itself. The observation that
    /// reaches the store last wins; every other observation on the same
    /// path is cancelled exactly once. Returns the observation as stored, or
    /// `None` if its registration no longer exists.
    pub async fn add_observation(
        &self,
        observation: Observation,
    ) -> ObservationResult<Option<Observation>> {
        let registration_id = observation.registration_id.clone();
        let key = (registration_id.clone(), observation.id.clone());
        self.pending.lock().insert(key.clone());

        let inserted = self
            .store
            .add_observation(&registration_id, observation.clone())
            .await;
        let inserted = match inserted {
            Ok(inserted) => inserted,
            Err(e) => {
                self.pending.lock().remove(&key);
                return Err(e.into());
            }
        };

        let Some(insert) = inserted else {
            self.pending.lock().remove(&key);
            tracing::debug!(
                registration_id = %registration_id,
                token = %observation.id,
                "Observation for unknown registration dropped"
            );
            self.cancel_at_endpoints(&observation);
            return Ok(None);
        };
        let stored = insert.observation;

        for superseded in &insert.superseded {
            self.observation_removed(superseded);
        }

        {
            let mut pending = self.pending.lock();
            // Already announced if a concurrent removal claimed it meanwhile
            if pending.remove(&key) {
                self.announce_added(&stored);
            }
        }

        // Another node may have stored an older observation on this path
        // without seeing ours.
        for existing in self.store.get_observations(&registration_id).await? {
            if stored.supersedes(&existing) {
                self.cancel_observation(&existing).await?;
            }
        }

        Ok(Some(stored))
    }

    /// Cancel one observation
    ///
    /// Both endpoints are told to drop the token. Returns false, without
    /// notifying listeners, if the observation was already gone.
    pub async fn cancel_observation(&self, observation: &Observation) -> ObservationResult<bool> {
        self.cancel_at_endpoints(observation);

        let removed = self
            .store
            .remove_observation(&observation.registration_id, &observation.id)
            .await?;

        match removed {
            Some(removed) => {
                self.announce_cancelled(&removed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every observation of `registration`
    pub async fn cancel_observations(&self, registration: &Registration) -> ObservationResult<usize> {
        if registration.id.is_empty() {
            return Ok(0);
        }

        let removed = self.store.remove_observations(&registration.id).await?;
        for observation in &removed {
            self.observation_removed(observation);
        }

        Ok(removed.len())
    }

    /// Cancel the observations of `registration` on `path`
    pub async fn cancel_observations_for_path(
        &self,
        registration: &Registration,
        path: &ResourcePath,
    ) -> ObservationResult<usize> {
        let mut cancelled = 0;
        for observation in self.get_observations(registration).await? {
            if observation.path == *path && self.cancel_observation(&observation).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Observations of `registration`; empty for an unknown registration
    pub async fn get_observations(
        &self,
        registration: &Registration,
    ) -> ObservationResult<Vec<Observation>> {
        if registration.id.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.get_observations(&registration.id).await?)
    }

    /// Handle a notification received for an observe request
    ///
    /// Notifications that cannot be attributed to a live observation are
    /// dropped without error. Only store failures are returned.
    pub async fn on_notification(
        &self,
        request: &NotificationRequest,
        response: &NotificationResponse,
    ) -> ObservationResult<()> {
        tracing::trace!(
            token = %response.token,
            code = %response.code,
            payload_len = response.payload.len(),
            "Notification received"
        );

        if self.listeners.is_empty() {
            return Ok(());
        }
        if !response.code.carries_value() {
            return Ok(());
        }

        let Some(registration_id) = request.registration_id() else {
            tracing::debug!(token = %response.token, "Notification without registration context dropped");
            return Ok(());
        };

        let Some(observation) = self
            .store
            .get_observation(&registration_id, &response.token)
            .await?
        else {
            tracing::debug!(
                registration_id = %registration_id,
                token = %response.token,
                "Notification for unknown observation dropped"
            );
            return Ok(());
        };

        // TODO: prune the token index when the registration is gone
        let Some(registration) = self
            .clients
            .find_by_registration_id(&observation.registration_id)
            .await?
        else {
            tracing::debug!(
                registration_id = %observation.registration_id,
                token = %response.token,
                "Notification for unknown registration dropped"
            );
            return Ok(());
        };

        let model = self.model_provider.object_model(&registration);
        let content_format = response.content_format();

        let nodes = match self.decoder.decode_timestamped(
            &response.payload,
            content_format,
            &observation.path,
            &model,
        ) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::debug!(
                    registration_id = %registration.id,
                    path = %e.path,
                    error = %e,
                    "Invalid notification payload"
                );
                return Ok(());
            }
        };

        let observe_response = ObserveResponse::from_nodes(nodes, observation.clone(), content_format);
        self.listeners
            .for_each(|l| l.new_value(&observation, &observe_response));

        Ok(())
    }

    /// Report an observation the store already removed
    fn observation_removed(&self, observation: &Observation) {
        self.cancel_at_endpoints(observation);
        self.announce_cancelled(observation);
    }

    fn announce_added(&self, observation: &Observation) {
        tracing::debug!(
            registration_id = %observation.registration_id,
            token = %observation.id,
            path = %observation.path,
            "Observation added"
        );
        self.listeners.for_each(|l| l.new_observation(observation));
    }

    /// Emit `cancelled`, preceded by `new_observation` if the add that
    /// stored `observation` has not announced it yet
    fn announce_cancelled(&self, observation: &Observation) {
        let mut pending = self.pending.lock();
        if pending.remove(&(observation.registration_id.clone(), observation.id.clone())) {
            self.announce_added(observation);
        }
        drop(pending);

        tracing::debug!(
            registration_id = %observation.registration_id,
            token = %observation.id,
            path = %observation.path,
            "Observation cancelled"
        );
        self.listeners.for_each(|l| l.cancelled(observation));
    }

    fn cancel_at_endpoints(&self, observation: &Observation) {
        let secure = self.secure_endpoint.read().clone();
        let non_secure = self.non_secure_endpoint.read().clone();
        for endpoint in secure.iter().chain(non_secure.iter()) {
            endpoint.cancel_observation(&observation.id);
        }
    }
}

impl Drop for ObservationRegistry {
    fn drop(&mut self) {
        self.clients.remove_listener(self.cascade_listener);
    }
}
