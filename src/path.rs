//! LWM2M node addressing
//!
//! A path names a node of the device tree at root, object, instance or
//! resource granularity: `/`, `/3`, `/3/0`, `/3/0/1`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Lwm2mError, Result};

/// Granularity of a [`Lwm2mPath`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathTier {
    Root,
    Object,
    Instance,
    Resource,
}

/// Address of a node in the device resource tree
///
/// Instances can only be built through the tier constructors or [`FromStr`], so a
/// resource id is never present without both an object and an instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Lwm2mPath {
    object_id: Option<u16>,
    instance_id: Option<u16>,
    resource_id: Option<u16>,
}

impl Lwm2mPath {
    /// The root path `/`
    pub const fn root() -> Self {
        Self {
            object_id: None,
            instance_id: None,
            resource_id: None,
        }
    }

    /// An object path like `/3`
    pub const fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            instance_id: None,
            resource_id: None,
        }
    }

    /// An object instance path like `/3/0`
    pub const fn instance(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            instance_id: Some(instance_id),
            resource_id: None,
        }
    }

    /// A resource path like `/3/0/1`
    pub const fn resource(object_id: u16, instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            instance_id: Some(instance_id),
            resource_id: Some(resource_id),
        }
    }

    pub fn object_id(&self) -> Option<u16> {
        self.object_id
    }

    pub fn instance_id(&self) -> Option<u16> {
        self.instance_id
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource_id
    }

    pub fn tier(&self) -> PathTier {
        match (self.object_id, self.instance_id, self.resource_id) {
            (None, _, _) => PathTier::Root,
            (Some(_), None, _) => PathTier::Object,
            (Some(_), Some(_), None) => PathTier::Instance,
            (Some(_), Some(_), Some(_)) => PathTier::Resource,
        }
    }

    pub fn is_root(&self) -> bool {
        self.tier() == PathTier::Root
    }

    pub fn is_object(&self) -> bool {
        self.tier() == PathTier::Object
    }

    pub fn is_instance(&self) -> bool {
        self.tier() == PathTier::Instance
    }

    pub fn is_resource(&self) -> bool {
        self.tier() == PathTier::Resource
    }

    /// Path one level below this one
    pub fn child(&self, id: u16) -> Result<Self> {
        match (self.object_id, self.instance_id) {
            _ if self.is_resource() => Err(Lwm2mError::MalformedPath(format!(
                "{}/{} is deeper than a resource",
                self, id
            ))),
            (None, _) => Ok(Self::object(id)),
            (Some(o), None) => Ok(Self::instance(o, id)),
            (Some(o), Some(i)) => Ok(Self::resource(o, i, id)),
        }
    }

    /// Path one level above this one; the root is its own parent
    pub fn parent(&self) -> Self {
        match (self.object_id, self.instance_id, self.resource_id) {
            (Some(o), Some(i), Some(_)) => Self::instance(o, i),
            (Some(o), Some(_), None) => Self::object(o),
            _ => Self::root(),
        }
    }
}

impl fmt::Display for Lwm2mPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(object_id) = self.object_id else {
            return f.write_str("/");
        };
        write!(f, "/{}", object_id)?;
        if let Some(instance_id) = self.instance_id {
            write!(f, "/{}", instance_id)?;
            if let Some(resource_id) = self.resource_id {
                write!(f, "/{}", resource_id)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Lwm2mPath {
    type Err = Lwm2mError;

    /// Parse `/3/0/1`; leading and a single trailing `/` are optional
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut ids = Vec::with_capacity(3);
        for segment in trimmed.split('/') {
            // u16::from_str would also take a leading '+'
            let id = Some(segment)
                .filter(|seg| seg.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|seg| seg.parse::<u16>().ok())
                .ok_or_else(|| {
                    Lwm2mError::MalformedPath(format!(
                        "{}: segment '{}' is not an id in 0..=65535",
                        s, segment
                    ))
                })?;
            ids.push(id);
        }

        match ids.as_slice() {
            [o] => Ok(Self::object(*o)),
            [o, i] => Ok(Self::instance(*o, *i)),
            [o, i, r] => Ok(Self::resource(*o, *i, *r)),
            _ => Err(Lwm2mError::MalformedPath(format!(
                "{}: more than three segments",
                s
            ))),
        }
    }
}
