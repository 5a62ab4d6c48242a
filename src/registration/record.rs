//! Registration record types
//!
//! A `Registration` describes one device's current session with the server.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Default lifetime announced by clients that omit it (seconds)
pub const DEFAULT_LIFETIME: u64 = 86_400;

/// Default LwM2M version when the client does not announce one
pub const DEFAULT_LWM2M_VERSION: &str = "1.0";

/// Server-assigned identifier of a registration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Transport binding announced by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BindingMode {
    /// UDP
    #[default]
    U,
    /// UDP with queue mode
    UQ,
    /// SMS
    S,
    /// SMS with queue mode
    SQ,
    /// UDP and SMS
    US,
    /// UDP with queue mode and SMS
    UQS,
}

impl BindingMode {
    /// Protocol letters for this binding
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingMode::U => "U",
            BindingMode::UQ => "UQ",
            BindingMode::S => "S",
            BindingMode::SQ => "SQ",
            BindingMode::US => "US",
            BindingMode::UQS => "UQS",
        }
    }

    /// Whether the client may be offline between requests
    pub fn is_queue_mode(&self) -> bool {
        matches!(self, BindingMode::UQ | BindingMode::SQ | BindingMode::UQS)
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown binding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown binding mode: {0}")]
pub struct UnknownBindingMode(pub String);

impl FromStr for BindingMode {
    type Err = UnknownBindingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "U" => Ok(BindingMode::U),
            "UQ" => Ok(BindingMode::UQ),
            "S" => Ok(BindingMode::S),
            "SQ" => Ok(BindingMode::SQ),
            "US" => Ok(BindingMode::US),
            "UQS" => Ok(BindingMode::UQS),
            other => Err(UnknownBindingMode(other.to_string())),
        }
    }
}

/// CoRE link announced in the registration payload (e.g. `</3/0>;ver="1.1"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute to the link
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Object id targeted by this link, if the url is an object or instance path
    pub fn object_id(&self) -> Option<u16> {
        let mut segments = self.url.trim_start_matches('/').split('/');
        segments.next().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.url)?;
        for (key, value) in &self.attributes {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

/// A device's current registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub endpoint: String,
    /// Address the client registered from
    pub address: SocketAddr,
    /// Local server address that received the registration
    pub registration_endpoint: Option<SocketAddr>,
    /// Lifetime in seconds
    pub lifetime: u64,
    pub lwm2m_version: String,
    pub binding_mode: BindingMode,
    pub sms_number: Option<String>,
    pub object_links: Vec<Link>,
    pub additional_attributes: BTreeMap<String, String>,
    pub registration_date: SystemTime,
    pub last_update: SystemTime,
}

impl Registration {
    /// Start building a registration
    pub fn builder(
        id: RegistrationId,
        endpoint: impl Into<String>,
        address: SocketAddr,
    ) -> RegistrationBuilder {
        RegistrationBuilder::new(id, endpoint, address)
    }

    /// Instant after which the registration is expired absent renewal
    ///
    /// `None` when the lifetime reaches past what `SystemTime` can hold; such
    /// a registration never expires.
    pub fn expiration_time(&self) -> Option<SystemTime> {
        self.last_update.checked_add(Duration::from_secs(self.lifetime))
    }

    /// Whether the registration is still alive at `now`
    pub fn is_alive_at(&self, now: SystemTime) -> bool {
        self.expiration_time().map_or(true, |expires| expires > now)
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive_at(SystemTime::now())
    }

    /// Objects supported by the client, with their announced version
    pub fn supported_objects(&self) -> BTreeMap<u16, String> {
        let mut objects = BTreeMap::new();
        for link in &self.object_links {
            if let Some(id) = link.object_id() {
                let version = link
                    .attributes
                    .get("ver")
                    .map(|v| v.trim_matches('"').to_string())
                    .unwrap_or_else(|| DEFAULT_LWM2M_VERSION.to_string());
                objects.entry(id).or_insert(version);
            }
        }
        objects
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registration[id={}, endpoint={}, address={}, lifetime={}, binding={}]",
            self.id, self.endpoint, self.address, self.lifetime, self.binding_mode
        )
    }
}

/// Builder for `Registration`
#[derive(Debug, Clone)]
pub struct RegistrationBuilder {
    registration: Registration,
}

impl RegistrationBuilder {
    fn new(id: RegistrationId, endpoint: impl Into<String>, address: SocketAddr) -> Self {
        let now = SystemTime::now();
        Self {
            registration: Registration {
                id,
                endpoint: endpoint.into(),
                address,
                registration_endpoint: None,
                lifetime: DEFAULT_LIFETIME,
                lwm2m_version: DEFAULT_LWM2M_VERSION.to_string(),
                binding_mode: BindingMode::default(),
                sms_number: None,
                object_links: Vec::new(),
                additional_attributes: BTreeMap::new(),
                registration_date: now,
                last_update: now,
            },
        }
    }

    pub fn lifetime(mut self, seconds: u64) -> Self {
        self.registration.lifetime = seconds;
        self
    }

    pub fn lwm2m_version(mut self, version: impl Into<String>) -> Self {
        self.registration.lwm2m_version = version.into();
        self
    }

    pub fn binding_mode(mut self, binding: BindingMode) -> Self {
        self.registration.binding_mode = binding;
        self
    }

    pub fn sms_number(mut self, number: impl Into<String>) -> Self {
        self.registration.sms_number = Some(number.into());
        self
    }

    pub fn object_links(mut self, links: Vec<Link>) -> Self {
        self.registration.object_links = links;
        self
    }

    pub fn registration_endpoint(mut self, addr: SocketAddr) -> Self {
        self.registration.registration_endpoint = Some(addr);
        self
    }

    pub fn additional_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.registration
            .additional_attributes
            .insert(key.into(), value.into());
        self
    }

    /// Set registration date and last update
    pub fn registered_at(mut self, at: SystemTime) -> Self {
        self.registration.registration_date = at;
        self.registration.last_update = at;
        self
    }

    pub fn last_update(mut self, at: SystemTime) -> Self {
        self.registration.last_update = at;
        self
    }

    pub fn build(self) -> Registration {
        self.registration
    }
}
