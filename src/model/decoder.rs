//! Payload decoder seam

use bytes::Bytes;

use super::node::{ContentFormat, TimestampedNode};
use super::ObjectModel;
use crate::observation::ResourcePath;

/// Payload could not be decoded into a node for `path`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvalidValue {
    pub message: String,
    pub path: ResourcePath,
}

impl InvalidValue {
    pub fn new(message: impl Into<String>, path: ResourcePath) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }
}

/// Decodes notification payloads into timestamped nodes
///
/// Implemented outside this crate by the object-model codec.
pub trait NodeDecoder: Send + Sync {
    fn decode_timestamped(
        &self,
        payload: &Bytes,
        format: Option<ContentFormat>,
        path: &ResourcePath,
        model: &ObjectModel,
    ) -> Result<Vec<TimestampedNode>, InvalidValue>;
}
