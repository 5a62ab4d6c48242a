//! Registration data model
//!
//! A registration is a device's current management session. It is created on
//! register, mutated only by updates, and destroyed on deregistration or
//! expiration. Removing a registration cascades to its observations; the
//! removed pair is returned as a [`Deregistration`].

pub mod record;
pub mod update;

pub use record::{
    BindingMode, Link, Registration, RegistrationBuilder, RegistrationId, UnknownBindingMode,
    DEFAULT_LIFETIME, DEFAULT_LWM2M_VERSION,
};
pub use update::RegistrationUpdate;

use crate::observation::Observation;

/// A removed registration together with the observations removed with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deregistration {
    pub registration: Registration,
    pub observations: Vec<Observation>,
}

impl Deregistration {
    pub fn new(registration: Registration, observations: Vec<Observation>) -> Self {
        Self {
            registration,
            observations,
        }
    }
}
