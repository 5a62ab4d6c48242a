//! Notification types exchanged with the protocol layer

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use super::record::{Observation, Token};
use crate::model::{ContentFormat, Node, TimestampedNode};
use crate::registration::RegistrationId;

/// User-context key carrying the registration id of an observe request
pub const CTX_REGID: &str = "regid";

/// Protocol response code (CoAP `class.detail` packed as `class << 5 | detail`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    InternalServerError,
    Other(u8),
}

impl ResponseCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            65 => ResponseCode::Created,
            66 => ResponseCode::Deleted,
            67 => ResponseCode::Valid,
            68 => ResponseCode::Changed,
            69 => ResponseCode::Content,
            128 => ResponseCode::BadRequest,
            129 => ResponseCode::Unauthorized,
            132 => ResponseCode::NotFound,
            133 => ResponseCode::MethodNotAllowed,
            134 => ResponseCode::NotAcceptable,
            160 => ResponseCode::InternalServerError,
            other => ResponseCode::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ResponseCode::Created => 65,
            ResponseCode::Deleted => 66,
            ResponseCode::Valid => 67,
            ResponseCode::Changed => 68,
            ResponseCode::Content => 69,
            ResponseCode::BadRequest => 128,
            ResponseCode::Unauthorized => 129,
            ResponseCode::NotFound => 132,
            ResponseCode::MethodNotAllowed => 133,
            ResponseCode::NotAcceptable => 134,
            ResponseCode::InternalServerError => 160,
            ResponseCode::Other(code) => *code,
        }
    }

    /// Whether a notification with this code carries a resource value
    pub fn carries_value(&self) -> bool {
        matches!(self, ResponseCode::Content | ResponseCode::Changed)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{}.{:02}", code >> 5, code & 0x1f)
    }
}

/// The observe request a notification answers, as seen by the protocol layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRequest {
    pub user_context: BTreeMap<String, String>,
}

impl NotificationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request context tagged with the registration it was issued for
    pub fn for_registration(registration_id: &RegistrationId) -> Self {
        Self::new().with_context(CTX_REGID, registration_id.as_str())
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_context.insert(key.into(), value.into());
        self
    }

    /// Registration id attached when the observe request was sent
    pub fn registration_id(&self) -> Option<RegistrationId> {
        self.user_context
            .get(CTX_REGID)
            .filter(|id| !id.is_empty())
            .map(RegistrationId::new)
    }
}

/// An asynchronous response correlated to an observation token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    pub code: ResponseCode,
    /// Content-format option, if present
    pub content_format: Option<u16>,
    pub payload: Bytes,
    pub token: Token,
}

impl NotificationResponse {
    pub fn new(code: ResponseCode, token: Token, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            content_format: None,
            payload: payload.into(),
            token,
        }
    }

    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format.code());
        self
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format.map(ContentFormat::from_code)
    }
}

/// Decoded content of a notification
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedContent {
    /// One current value
    Single(Node),
    /// Several values, or values stamped by the device
    Series(Vec<TimestampedNode>),
}

/// A decoded notification, delivered to observation listeners
#[derive(Debug, Clone, PartialEq)]
pub struct ObserveResponse {
    pub code: ResponseCode,
    pub content: ObservedContent,
    pub observation: Observation,
    pub content_format: Option<ContentFormat>,
}

impl ObserveResponse {
    /// Wrap decoded nodes
    ///
    /// A single node without a timestamp becomes [`ObservedContent::Single`];
    /// anything else is kept as a series.
    pub fn from_nodes(
        mut nodes: Vec<TimestampedNode>,
        observation: Observation,
        content_format: Option<ContentFormat>,
    ) -> Self {
        let content = match nodes.pop() {
            Some(only) if nodes.is_empty() && !only.is_timestamped() => {
                ObservedContent::Single(only.node)
            }
            Some(last) => {
                nodes.push(last);
                ObservedContent::Series(nodes)
            }
            None => ObservedContent::Series(nodes),
        };

        Self {
            code: ResponseCode::Content,
            content,
            observation,
            content_format,
        }
    }

    /// The single current value, if the notification carried exactly one
    pub fn node(&self) -> Option<&Node> {
        match &self.content {
            ObservedContent::Single(node) => Some(node),
            ObservedContent::Series(_) => None,
        }
    }

    /// The value series, if the notification carried more than one value or timestamps
    pub fn timestamped_nodes(&self) -> Option<&[TimestampedNode]> {
        match &self.content {
            ObservedContent::Single(_) => None,
            ObservedContent::Series(nodes) => Some(nodes),
        }
    }
}
