//! Decoded node values and content formats

use std::fmt;

use bytes::Bytes;

use crate::observation::ResourcePath;

/// Content format option of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    Text,
    Link,
    Opaque,
    Cbor,
    SenmlJson,
    SenmlCbor,
    Tlv,
    Json,
    Unknown(u16),
}

impl ContentFormat {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ContentFormat::Text,
            40 => ContentFormat::Link,
            42 => ContentFormat::Opaque,
            60 => ContentFormat::Cbor,
            110 => ContentFormat::SenmlJson,
            112 => ContentFormat::SenmlCbor,
            11542 => ContentFormat::Tlv,
            11543 => ContentFormat::Json,
            other => ContentFormat::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::Text => 0,
            ContentFormat::Link => 40,
            ContentFormat::Opaque => 42,
            ContentFormat::Cbor => 60,
            ContentFormat::SenmlJson => 110,
            ContentFormat::SenmlCbor => 112,
            ContentFormat::Tlv => 11542,
            ContentFormat::Json => 11543,
            ContentFormat::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentFormat::Unknown(code) => write!(f, "unknown({})", code),
            other => write!(f, "{:?}({})", other, other.code()),
        }
    }
}

/// Value of a single resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Opaque(Bytes),
    /// Seconds since the unix epoch
    Time(i64),
    ObjectLink(u16, u16),
}

/// One resource (or resource instance) value inside a node
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceValue {
    pub path: ResourcePath,
    pub value: Value,
}

/// A decoded node: the value(s) found under `path`
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub path: ResourcePath,
    pub values: Vec<ResourceValue>,
}

impl Node {
    /// Node holding a single resource value
    pub fn single(path: ResourcePath, value: Value) -> Self {
        Self {
            path,
            values: vec![ResourceValue { path, value }],
        }
    }

    /// Value of the first resource, if any
    pub fn value(&self) -> Option<&Value> {
        self.values.first().map(|v| &v.value)
    }
}

/// A node optionally stamped with the time it was sampled
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedNode {
    /// Seconds since the unix epoch
    pub timestamp: Option<i64>,
    pub node: Node,
}

impl TimestampedNode {
    pub fn new(timestamp: Option<i64>, node: Node) -> Self {
        Self { timestamp, node }
    }

    pub fn untimestamped(node: Node) -> Self {
        Self::new(None, node)
    }

    pub fn is_timestamped(&self) -> bool {
        self.timestamp.is_some()
    }
}
