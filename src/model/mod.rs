//! Object model collaborators
//!
//! The server does not validate or encode values itself. It asks a
//! [`ModelProvider`] for the object definitions a client supports and hands
//! payloads to a [`NodeDecoder`].

pub mod decoder;
pub mod node;

pub use decoder::{InvalidValue, NodeDecoder};
pub use node::{ContentFormat, Node, ResourceValue, TimestampedNode, Value};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::registration::Registration;

/// Declared type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    String,
    Integer,
    Float,
    Boolean,
    Opaque,
    Time,
    ObjectLink,
    None,
}

/// Definition of one resource of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinition {
    pub id: u16,
    pub name: String,
    pub resource_type: ResourceType,
    pub multiple: bool,
}

/// Definition of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDefinition {
    pub id: u16,
    pub name: String,
    pub version: String,
    pub multiple: bool,
    pub resources: BTreeMap<u16, ResourceDefinition>,
}

impl ObjectDefinition {
    pub fn new(id: u16, name: impl Into<String>, multiple: bool) -> Self {
        Self {
            id,
            name: name.into(),
            version: crate::registration::DEFAULT_LWM2M_VERSION.to_string(),
            multiple,
            resources: BTreeMap::new(),
        }
    }

    pub fn with_resource(
        mut self,
        id: u16,
        name: impl Into<String>,
        resource_type: ResourceType,
        multiple: bool,
    ) -> Self {
        self.resources.insert(
            id,
            ResourceDefinition {
                id,
                name: name.into(),
                resource_type,
                multiple,
            },
        );
        self
    }
}

/// Set of object definitions used to decode one client's payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectModel {
    objects: BTreeMap<u16, ObjectDefinition>,
}

impl ObjectModel {
    pub fn new(objects: impl IntoIterator<Item = ObjectDefinition>) -> Self {
        Self {
            objects: objects.into_iter().map(|o| (o.id, o)).collect(),
        }
    }

    pub fn object(&self, id: u16) -> Option<&ObjectDefinition> {
        self.objects.get(&id)
    }

    pub fn resource(&self, object: u16, resource: u16) -> Option<&ResourceDefinition> {
        self.objects.get(&object)?.resources.get(&resource)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.objects.values()
    }
}

/// Resolves the object model of a registered client
pub trait ModelProvider: Send + Sync {
    fn object_model(&self, registration: &Registration) -> Arc<ObjectModel>;
}

/// Serves the same model to every client
#[derive(Debug, Clone, Default)]
pub struct StaticModelProvider {
    model: Arc<ObjectModel>,
}

impl StaticModelProvider {
    pub fn new(objects: impl IntoIterator<Item = ObjectDefinition>) -> Self {
        Self {
            model: Arc::new(ObjectModel::new(objects)),
        }
    }
}

impl ModelProvider for StaticModelProvider {
    fn object_model(&self, _registration: &Registration) -> Arc<ObjectModel> {
        Arc::clone(&self.model)
    }
}
