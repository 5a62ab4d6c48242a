//! Observations and their notifications
//!
//! An [`Observation`] is a server-initiated subscription to one resource path
//! of one registration, identified by the protocol token of its observe
//! request. The [`ObservationRegistry`] keeps at most one live observation per
//! path and turns protocol notifications back into decoded values for its
//! listeners.
//!
//! # Notification path
//!
//! ```text
//!  protocol layer ── on_notification(request, response)
//!                         │
//!                         ├─ registration id from request context (CTX_REGID)
//!                         ├─ store.get_observation(id, token)
//!                         ├─ clients.find_by_registration_id(id)
//!                         ├─ model_provider.object_model(registration)
//!                         ├─ decoder.decode_timestamped(payload, ...)
//!                         ▼
//!              ObservationListener::new_value(observation, ObserveResponse)
//! ```
//!
//! Any step that finds nothing drops the notification.

pub mod error;
pub mod listener;
pub mod notification;
pub mod path;
pub mod record;
pub mod registry;

pub use error::{ObservationError, ObservationResult};
pub use listener::ObservationListener;
pub use notification::{
    NotificationRequest, NotificationResponse, ObserveResponse, ObservedContent, ResponseCode,
    CTX_REGID,
};
pub use path::{PathError, ResourcePath};
pub use record::{Observation, Token};
pub use registry::ObservationRegistry;
