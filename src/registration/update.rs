//! Registration update (renewal) requests

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use super::record::{BindingMode, Link, Registration, RegistrationId};

/// Fields a client may change when it renews its registration
///
/// `None` means "unchanged". The source address is always taken from the
/// update since the client may have moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationUpdate {
    pub registration_id: RegistrationId,
    pub address: SocketAddr,
    pub lifetime: Option<u64>,
    pub sms_number: Option<String>,
    pub binding_mode: Option<BindingMode>,
    pub object_links: Option<Vec<Link>>,
    pub additional_attributes: Option<BTreeMap<String, String>>,
}

impl RegistrationUpdate {
    /// Create an update that only refreshes the registration
    pub fn new(registration_id: RegistrationId, address: SocketAddr) -> Self {
        Self {
            registration_id,
            address,
            lifetime: None,
            sms_number: None,
            binding_mode: None,
            object_links: None,
            additional_attributes: None,
        }
    }

    pub fn lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = Some(seconds);
        self
    }

    pub fn sms_number(mut self, number: impl Into<String>) -> Self {
        self.sms_number = Some(number.into());
        self
    }

    pub fn binding_mode(mut self, binding: BindingMode) -> Self {
        self.binding_mode = Some(binding);
        self
    }

    pub fn object_links(mut self, links: Vec<Link>) -> Self {
        self.object_links = Some(links);
        self
    }

    pub fn additional_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.additional_attributes = Some(attributes);
        self
    }

    /// Merge this update into `registration`, stamping `now` as last update
    pub fn apply(&self, registration: &Registration, now: SystemTime) -> Registration {
        let mut updated = registration.clone();
        updated.address = self.address;
        if let Some(lifetime) = self.lifetime {
            updated.lifetime = lifetime;
        }
        if let Some(ref number) = self.sms_number {
            updated.sms_number = Some(number.clone());
        }
        if let Some(binding) = self.binding_mode {
            updated.binding_mode = binding;
        }
        if let Some(ref links) = self.object_links {
            updated.object_links = links.clone();
        }
        if let Some(ref attributes) = self.additional_attributes {
            updated.additional_attributes = attributes.clone();
        }
        updated.last_update = now;
        updated
    }
}

impl fmt::Display for RegistrationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegistrationUpdate[id={}, address={}, lifetime={:?}, binding={:?}]",
            self.registration_id, self.address, self.lifetime, self.binding_mode
        )
    }
}
