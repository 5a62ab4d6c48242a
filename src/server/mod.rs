//! Server wiring
//!
//! A [`Server`] value owns the registration store and the two registries
//! built over it. There is no process-wide instance: build one with
//! [`ServerBuilder`], pass it (or its registries) to the protocol layer, and
//! start/stop it explicitly.

pub mod builder;
pub mod config;

pub use builder::ServerBuilder;
pub use config::{ConfigError, SecurityMode, ServerConfig, StoreKind};

use std::sync::Arc;

use crate::observation::ObservationRegistry;
use crate::registry::ClientRegistry;
use crate::store::RegistrationStore;

/// An assembled registration server
pub struct Server {
    config: ServerConfig,
    store: Arc<dyn RegistrationStore>,
    clients: Arc<ClientRegistry>,
    observations: Arc<ObservationRegistry>,
}

impl Server {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn observations(&self) -> &Arc<ObservationRegistry> {
        &self.observations
    }

    /// Start background work (the expiration sweeper)
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.clients.start();
        tracing::info!(store = ?self.config.store, "Server started");
    }

    pub fn stop(&self) {
        self.clients.stop();
        tracing::info!("Server stopped");
    }
}
