//! LwM2M server core: client registrations, observations and their expiry
//!
//! Devices register with an endpoint name and a lifetime, renew before the
//! lifetime runs out, and deregister when they leave. The server observes
//! device resources and receives notifications for them. This crate keeps
//! that state consistent when many protocol workers, a background sweeper
//! and possibly several server nodes touch it at once.
//!
//! # Architecture
//!
//! ```text
//!        protocol layer (CoAP)                          listeners
//!   register/update/deregister  notify          registered/updated/unregistered
//!            │                    │              new_observation/cancelled/new_value
//!            ▼                    ▼                          ▲
//!    ┌──────────────┐    ┌────────────────────┐              │
//!    │ClientRegistry│◄───│ObservationRegistry │──────────────┘
//!    └──────┬───────┘    └─────────┬──────────┘
//!           │                      │
//!           ▼                      ▼
//!    ┌─────────────────────────────────────┐      ┌──────────────────┐
//!    │     Arc<dyn RegistrationStore>      │◄─────│ExpirationSweeper │
//!    └─────────────────────────────────────┘      └──────────────────┘
//!      InMemoryRegistrationStore | SharedRegistrationStore<MemoryBackend | RedisBackend>
//! ```
//!
//! The store is the only mutator of registration and observation state.
//! Registries call it and report what it did; listeners only ever hear
//! about completed store operations.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lwm2m_registry::server::{ServerBuilder, ServerConfig};
//!
//! let server = ServerBuilder::new(ServerConfig::from_env()?)
//!     .decoder(Arc::new(my_decoder))
//!     .build()
//!     .await?;
//! server.clients().add_listener(Arc::new(my_listener));
//! server.start();
//! ```

pub mod endpoint;
pub mod listener;
pub mod model;
pub mod observation;
pub mod registration;
pub mod registry;
pub mod server;
pub mod store;

pub use endpoint::ObservationEndpoint;
pub use listener::ListenerId;
pub use observation::{Observation, ObservationListener, ObservationRegistry, ResourcePath, Token};
pub use registration::{Deregistration, Registration, RegistrationId, RegistrationUpdate};
pub use registry::{ClientRegistry, RegistrationListener, RegistryError};
pub use server::{Server, ServerBuilder, ServerConfig};
pub use store::{InMemoryRegistrationStore, RegistrationStore, SharedRegistrationStore, StoreError};

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
