//! Server assembly

use std::sync::Arc;

use super::config::{ConfigError, ServerConfig, StoreKind};
use super::Server;
use crate::model::{ModelProvider, NodeDecoder, StaticModelProvider};
use crate::observation::ObservationRegistry;
use crate::registry::ClientRegistry;
use crate::store::{
    InMemoryRegistrationStore, MemoryBackend, RegistrationStore, SharedRegistrationStore,
};

/// Builds a [`Server`] from a [`ServerConfig`] and its collaborators
pub struct ServerBuilder {
    config: ServerConfig,
    model_provider: Option<Arc<dyn ModelProvider>>,
    decoder: Option<Arc<dyn NodeDecoder>>,
    shared_backend: Option<Arc<MemoryBackend>>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            model_provider: None,
            decoder: None,
            shared_backend: None,
        }
    }

    /// Object model source; every client gets an empty model by default
    pub fn model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    /// Payload decoder used for notifications (required)
    pub fn decoder(mut self, decoder: Arc<dyn NodeDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Backend for [`StoreKind::SharedMemory`]
    ///
    /// Servers built with the same backend behave as nodes of one cluster.
    pub fn shared_backend(mut self, backend: Arc<MemoryBackend>) -> Self {
        self.shared_backend = Some(backend);
        self
    }

    /// Validate the configuration, connect the store and wire the registries
    pub async fn build(self) -> Result<Server, ConfigError> {
        self.config.validate()?;

        let decoder = self.decoder.ok_or(ConfigError::Missing("node decoder"))?;
        let model_provider: Arc<dyn ModelProvider> = match self.model_provider {
            Some(provider) => provider,
            None => Arc::new(StaticModelProvider::default()),
        };

        let store_config = self.config.store_config.clone();
        let store: Arc<dyn RegistrationStore> = match &self.config.store {
            StoreKind::InMemory => InMemoryRegistrationStore::with_config(store_config),
            StoreKind::SharedMemory => {
                let backend = self
                    .shared_backend
                    .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
                SharedRegistrationStore::with_config(backend, store_config)
            }
            #[cfg(feature = "redis-store")]
            StoreKind::Redis { url } => {
                let backend = crate::store::RedisBackend::connect(url).await?;
                SharedRegistrationStore::with_config(backend, store_config)
            }
            #[cfg(not(feature = "redis-store"))]
            StoreKind::Redis { url } => {
                return Err(ConfigError::Unsupported(format!(
                    "redis store at {} requires the redis-store feature",
                    url
                )));
            }
        };

        let clients = ClientRegistry::new(Arc::clone(&store));
        let observations =
            ObservationRegistry::new(Arc::clone(&store), Arc::clone(&clients), model_provider, decoder);

        tracing::info!(
            store = ?self.config.store,
            security = %self.config.security,
            "Server assembled"
        );

        Ok(Server {
            config: self.config,
            store,
            clients,
            observations,
        })
    }
}
