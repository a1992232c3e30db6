//! LWM2M node tree
//!
//! Values read from or written to a device: a single resource, a multiple
//! resource, an object instance or a whole object. Every node carries its own
//! id so the full path can be rebuilt from the parent ids.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::ResourceType;
use crate::path::{Lwm2mPath, PathTier};

/// Typed value of a resource or resource instance
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Opaque(Vec<u8>),
    /// Seconds since the Unix epoch
    Time(i64),
    ObjectLink(u16, u16),
}

impl Value {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Value::String(_) => ResourceType::String,
            Value::Integer(_) => ResourceType::Integer,
            Value::Float(_) => ResourceType::Float,
            Value::Boolean(_) => ResourceType::Boolean,
            Value::Opaque(_) => ResourceType::Opaque,
            Value::Time(_) => ResourceType::Time,
            Value::ObjectLink(_, _) => ResourceType::ObjectLink,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(n) | Value::Time(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Opaque(bytes) => write!(f, "{} bytes", bytes.len()),
            Value::ObjectLink(o, i) => write!(f, "{}:{}", o, i),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Opaque(bytes)
    }
}

/// Content of a resource: one value, or values indexed by resource instance id
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Single(Value),
    Multiple(BTreeMap<u16, Value>),
}

/// A resource and its content
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: u16,
    pub value: ResourceValue,
}

impl Resource {
    pub fn single(id: u16, value: impl Into<Value>) -> Self {
        Self {
            id,
            value: ResourceValue::Single(value.into()),
        }
    }

    pub fn multiple(id: u16, values: BTreeMap<u16, Value>) -> Self {
        Self {
            id,
            value: ResourceValue::Multiple(values),
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self.value, ResourceValue::Multiple(_))
    }

    /// The value of a single resource
    pub fn single_value(&self) -> Option<&Value> {
        match &self.value {
            ResourceValue::Single(v) => Some(v),
            ResourceValue::Multiple(_) => None,
        }
    }
}

/// An object instance: resources keyed by resource id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectInstance {
    pub id: u16,
    pub resources: BTreeMap<u16, Resource>,
}

impl ObjectInstance {
    pub fn new(id: u16, resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            id,
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

/// An object: instances keyed by instance id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    pub id: u16,
    pub instances: BTreeMap<u16, ObjectInstance>,
}

impl Object {
    pub fn new(id: u16, instances: impl IntoIterator<Item = ObjectInstance>) -> Self {
        Self {
            id,
            instances: instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }
}

/// Shape of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Single,
    Multiple,
    Instance,
    Object,
}

/// Any node of the device tree
#[derive(Debug, Clone, PartialEq)]
pub enum Lwm2mNode {
    Object(Object),
    Instance(ObjectInstance),
    Resource(Resource),
}

impl Lwm2mNode {
    pub fn id(&self) -> u16 {
        match self {
            Lwm2mNode::Object(o) => o.id,
            Lwm2mNode::Instance(i) => i.id,
            Lwm2mNode::Resource(r) => r.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Lwm2mNode::Object(_) => NodeKind::Object,
            Lwm2mNode::Instance(_) => NodeKind::Instance,
            Lwm2mNode::Resource(r) if r.is_multiple() => NodeKind::Multiple,
            Lwm2mNode::Resource(_) => NodeKind::Single,
        }
    }

    /// Whether this node may be read from or written to `path`
    pub fn matches_tier(&self, path: &Lwm2mPath) -> bool {
        match (path.tier(), self) {
            (PathTier::Object, Lwm2mNode::Object(o)) => path.object_id() == Some(o.id),
            (PathTier::Instance, Lwm2mNode::Instance(i)) => path.instance_id() == Some(i.id),
            (PathTier::Resource, Lwm2mNode::Resource(r)) => path.resource_id() == Some(r.id),
            _ => false,
        }
    }
}

impl From<Object> for Lwm2mNode {
    fn from(o: Object) -> Self {
        Lwm2mNode::Object(o)
    }
}

impl From<ObjectInstance> for Lwm2mNode {
    fn from(i: ObjectInstance) -> Self {
        Lwm2mNode::Instance(i)
    }
}

impl From<Resource> for Lwm2mNode {
    fn from(r: Resource) -> Self {
        Lwm2mNode::Resource(r)
    }
}
