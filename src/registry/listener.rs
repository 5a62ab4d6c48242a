//! Registration lifecycle listener

use crate::observation::Observation;
use crate::registration::{Registration, RegistrationUpdate};

/// Receives registration lifecycle events
///
/// Events are delivered after the store operation they describe has
/// completed. `unregistered` is used for every removal cause: explicit
/// deregistration, replacement by a new registration of the same endpoint,
/// and expiration.
pub trait RegistrationListener: Send + Sync {
    fn registered(&self, _registration: &Registration) {}

    fn updated(&self, _update: &RegistrationUpdate, _registration: &Registration) {}

    /// `observations` are the observations removed together with the registration
    fn unregistered(&self, _registration: &Registration, _observations: &[Observation]) {}
}
