//! Key layout of the shared store
//!
//! ```text
//! <prefix>REG:ID:<registration id>          registration JSON
//! <prefix>REG:EP:<endpoint name>            registration id
//! <prefix>OBS:IDX:<registration id>         ObservationIndex JSON
//! <prefix>OBS:TKN:<registration id>:<hex>   observation JSON
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::observation::Token;
use crate::registration::RegistrationId;

#[derive(Debug, Clone)]
pub(crate) struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub(crate) fn registration(&self, id: &RegistrationId) -> String {
        format!("{}REG:ID:{}", self.prefix, id)
    }

    pub(crate) fn registrations(&self) -> String {
        format!("{}REG:ID:", self.prefix)
    }

    pub(crate) fn endpoint(&self, endpoint: &str) -> String {
        format!("{}REG:EP:{}", self.prefix, endpoint)
    }

    pub(crate) fn observation_index(&self, id: &RegistrationId) -> String {
        format!("{}OBS:IDX:{}", self.prefix, id)
    }

    pub(crate) fn observation(&self, id: &RegistrationId, token_hex: &str) -> String {
        format!("{}OBS:TKN:{}:{}", self.prefix, id, token_hex)
    }

    pub(crate) fn observation_for(&self, id: &RegistrationId, token: &Token) -> String {
        self.observation(id, &token.to_hex())
    }
}

/// Per-registration observation index
///
/// Every observation mutation rewrites this value, so guarding on it
/// serialises all observation changes of one registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ObservationIndex {
    pub(crate) next_sequence: u64,
    pub(crate) tokens: BTreeSet<String>,
}
