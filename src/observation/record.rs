//! Observation record types

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::path::ResourcePath;
use crate::registration::RegistrationId;

/// Opaque correlation token assigned by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(Bytes);

impl Token {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lower-case hex form, used in store keys
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(|bytes| Self(Bytes::from(bytes)))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Token {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_hex()
    }
}

/// An active subscription to one resource path of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Token,
    pub registration_id: RegistrationId,
    pub path: ResourcePath,
    /// Context captured when the observe request was issued
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Insertion order assigned by the store, 0 until persisted
    #[serde(default)]
    pub sequence: u64,
}

impl Observation {
    pub fn new(id: Token, registration_id: RegistrationId, path: ResourcePath) -> Self {
        Self {
            id,
            registration_id,
            path,
            context: BTreeMap::new(),
            sequence: 0,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Whether `other` was stored before this observation
    pub fn supersedes(&self, other: &Observation) -> bool {
        self.path == other.path && self.id != other.id && other.sequence < self.sequence
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Observation[token={}, registration={}, path={}]",
            self.id, self.registration_id, self.path
        )
    }
}
