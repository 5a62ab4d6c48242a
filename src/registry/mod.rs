//! Client registry
//!
//! Public coordinator for registration lifecycle. Protocol handlers call
//! `register_client` / `update_client` / `deregister_client`; the registry
//! delegates to the store and fans the outcome out to its listeners.
//!
//! # Event flow
//!
//! ```text
//!   register / update / deregister          ExpirationSweeper
//!                 │                                │
//!                 ▼                                ▼
//!          ClientRegistry ──────────────► RegistrationStore
//!                 │          (atomic op)           │
//!                 │                                │ registration_expired
//!                 ▼                                ▼
//!        ListenerSet<dyn RegistrationListener> (snapshot per dispatch)
//!                 │
//!     registered / updated / unregistered
//! ```
//!
//! Expirations and replacements are reported as `unregistered`, the same
//! event as an explicit deregistration.

pub mod clients;
pub mod error;
pub mod listener;

pub use clients::ClientRegistry;
pub use error::{RegistryError, RegistryResult};
pub use listener::RegistrationListener;
