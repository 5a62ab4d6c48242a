//! Resource paths (`/object/instance/resource/resource-instance`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned for a malformed resource path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty resource path")]
    Empty,
    #[error("too many segments in resource path: {0}")]
    TooLong(String),
    #[error("invalid segment `{segment}` in resource path {path}")]
    InvalidSegment { path: String, segment: String },
}

/// Path of an LwM2M node: object, instance, resource or resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath {
    object: u16,
    instance: Option<u16>,
    resource: Option<u16>,
    resource_instance: Option<u16>,
}

impl ResourcePath {
    pub fn object(object: u16) -> Self {
        Self {
            object,
            instance: None,
            resource: None,
            resource_instance: None,
        }
    }

    pub fn instance(object: u16, instance: u16) -> Self {
        Self {
            instance: Some(instance),
            ..Self::object(object)
        }
    }

    pub fn resource(object: u16, instance: u16, resource: u16) -> Self {
        Self {
            resource: Some(resource),
            ..Self::instance(object, instance)
        }
    }

    pub fn resource_instance(object: u16, instance: u16, resource: u16, id: u16) -> Self {
        Self {
            resource_instance: Some(id),
            ..Self::resource(object, instance, resource)
        }
    }

    pub fn object_id(&self) -> u16 {
        self.object
    }

    pub fn instance_id(&self) -> Option<u16> {
        self.instance
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource
    }

    pub fn resource_instance_id(&self) -> Option<u16> {
        self.resource_instance
    }

    pub fn is_object(&self) -> bool {
        self.instance.is_none()
    }

    pub fn is_instance(&self) -> bool {
        self.instance.is_some() && self.resource.is_none()
    }

    pub fn is_resource(&self) -> bool {
        self.resource.is_some() && self.resource_instance.is_none()
    }

    pub fn is_resource_instance(&self) -> bool {
        self.resource_instance.is_some()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object)?;
        for id in [self.instance, self.resource, self.resource_instance]
            .into_iter()
            .flatten()
        {
            write!(f, "/{}", id)?;
        }
        Ok(())
    }
}

impl FromStr for ResourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut ids = [None; 4];
        for (i, segment) in trimmed.split('/').enumerate() {
            if i >= ids.len() {
                return Err(PathError::TooLong(s.to_string()));
            }
            let id = segment.parse::<u16>().map_err(|_| PathError::InvalidSegment {
                path: s.to_string(),
                segment: segment.to_string(),
            })?;
            ids[i] = Some(id);
        }

        Ok(Self {
            object: ids[0].ok_or(PathError::Empty)?,
            instance: ids[1],
            resource: ids[2],
            resource_instance: ids[3],
        })
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path: ResourcePath = "/3/0/1".parse().unwrap();
        assert_eq!(path, ResourcePath::resource(3, 0, 1));
        assert!(path.is_resource());
        assert_eq!(path.to_string(), "/3/0/1");

        let object: ResourcePath = "3".parse().unwrap();
        assert!(object.is_object());
        assert_eq!(object.to_string(), "/3");

        let ri: ResourcePath = "/3/0/7/1".parse().unwrap();
        assert!(ri.is_resource_instance());
        assert_eq!(ri.resource_instance_id(), Some(1));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ResourcePath>(), Err(PathError::Empty));
        assert_eq!("/".parse::<ResourcePath>(), Err(PathError::Empty));
        assert!(matches!(
            "/3/0/1/2/3".parse::<ResourcePath>(),
            Err(PathError::TooLong(_))
        ));
        assert!(matches!(
            "/3/x".parse::<ResourcePath>(),
            Err(PathError::InvalidSegment { .. })
        ));
        assert!(matches!(
            "/3/70000".parse::<ResourcePath>(),
            Err(PathError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let path = ResourcePath::instance(3303, 0);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/3303/0\"");
        let back: ResourcePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
