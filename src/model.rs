//! LWM2M object model
//!
//! Describes which resources an object has and what type their values are.
//! TLV and plain-text payloads carry no type information, so the codecs consult
//! the model to turn raw bytes into typed values.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Lwm2mError, Result};

/// Data type of a resource value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    String,
    Integer,
    Float,
    Boolean,
    Opaque,
    Time,
    ObjectLink,
    /// Executable resources carry no value
    None,
}

impl ResourceType {
    /// Parse the type field of an object definition
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "opaque" => Some(Self::Opaque),
            "time" => Some(Self::Time),
            "objlnk" => Some(Self::ObjectLink),
            "" | "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Operations a resource supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operations {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Operations {
    pub const R: Self = Self::new(true, false, false);
    pub const W: Self = Self::new(false, true, false);
    pub const RW: Self = Self::new(true, true, false);
    pub const E: Self = Self::new(false, false, true);

    const fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }

    /// Parse strings like `"R"`, `"RW"`, `"E"` or `"NONE"`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_uppercase();
        if s.is_empty() || s == "NONE" {
            return Some(Self::default());
        }
        let mut ops = Self::default();
        for c in s.chars() {
            match c {
                'R' => ops.read = true,
                'W' => ops.write = true,
                'E' => ops.execute = true,
                _ => return None,
            }
        }
        Some(ops)
    }
}

/// Definition of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub id: u16,
    pub name: String,
    pub operations: Operations,
    pub multiple: bool,
    pub mandatory: bool,
    pub kind: ResourceType,
}

/// Definition of an object and its resources
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    pub id: u16,
    pub name: String,
    pub multiple: bool,
    pub mandatory: bool,
    pub resources: BTreeMap<u16, ResourceSpec>,
}

/// Raw object definition structure for deserialization
#[derive(Debug, Deserialize)]
struct RawObjectSpec {
    id: u16,
    name: String,
    #[serde(default)]
    instancetype: Option<String>,
    #[serde(default)]
    mandatory: bool,
    #[serde(default, alias = "resources")]
    resourcedefs: Vec<RawResourceSpec>,
}

#[derive(Debug, Deserialize)]
struct RawResourceSpec {
    id: u16,
    name: String,
    #[serde(default)]
    operations: String,
    #[serde(default)]
    instancetype: Option<String>,
    #[serde(default)]
    mandatory: bool,
    #[serde(rename = "type", default)]
    kind: String,
}

fn is_multiple(instancetype: Option<&str>) -> bool {
    matches!(instancetype, Some(t) if t.eq_ignore_ascii_case("multiple"))
}

impl TryFrom<RawResourceSpec> for ResourceSpec {
    type Error = Lwm2mError;

    fn try_from(raw: RawResourceSpec) -> Result<Self> {
        let operations = Operations::parse(&raw.operations).ok_or_else(|| {
            Lwm2mError::InvalidModel(format!(
                "resource {} ({}): unknown operations '{}'",
                raw.id, raw.name, raw.operations
            ))
        })?;
        let kind = ResourceType::from_string(&raw.kind).ok_or_else(|| {
            Lwm2mError::InvalidModel(format!(
                "resource {} ({}): unknown type '{}'",
                raw.id, raw.name, raw.kind
            ))
        })?;
        Ok(Self {
            id: raw.id,
            multiple: is_multiple(raw.instancetype.as_deref()),
            name: raw.name,
            operations,
            mandatory: raw.mandatory,
            kind,
        })
    }
}

/// Collection of object definitions known to a server or client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lwm2mModel {
    objects: HashMap<u16, ObjectSpec>,
}

impl Lwm2mModel {
    /// An empty model; every resource decodes as opaque
    pub fn empty() -> Self {
        Self::default()
    }

    /// Model with the core objects Security (0), Server (1) and Device (3)
    pub fn core() -> Self {
        let mut model = Self::empty();
        for object in core_objects() {
            model.objects.insert(object.id, object);
        }
        model
    }

    /// Parse a model from a JSON array of object definitions
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: Vec<RawObjectSpec> = serde_json::from_str(content)?;

        let mut objects = HashMap::with_capacity(raw.len());
        for raw_object in raw {
            let mut resources = BTreeMap::new();
            for raw_resource in raw_object.resourcedefs {
                let spec = ResourceSpec::try_from(raw_resource)?;
                if resources.insert(spec.id, spec).is_some() {
                    return Err(Lwm2mError::InvalidModel(format!(
                        "object {} defines a resource id twice",
                        raw_object.id
                    )));
                }
            }
            let object = ObjectSpec {
                id: raw_object.id,
                name: raw_object.name,
                multiple: is_multiple(raw_object.instancetype.as_deref()),
                mandatory: raw_object.mandatory,
                resources,
            };
            if objects.insert(object.id, object).is_some() {
                return Err(Lwm2mError::InvalidModel(format!(
                    "object {} defined twice",
                    raw_object.id
                )));
            }
        }

        Ok(Self { objects })
    }

    /// Load a model from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Add the objects of `other`, replacing definitions with the same id
    pub fn merge(mut self, other: Lwm2mModel) -> Self {
        self.objects.extend(other.objects);
        self
    }

    pub fn object_spec(&self, object_id: u16) -> Option<&ObjectSpec> {
        self.objects.get(&object_id)
    }

    pub fn resource_spec(&self, object_id: u16, resource_id: u16) -> Option<&ResourceSpec> {
        self.objects
            .get(&object_id)
            .and_then(|o| o.resources.get(&resource_id))
    }

    /// Type of a resource, or `None` when the model does not know it
    pub fn resource_type(&self, object_id: u16, resource_id: u16) -> Option<ResourceType> {
        self.resource_spec(object_id, resource_id).map(|r| r.kind)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.objects.keys().copied()
    }
}

impl std::str::FromStr for Lwm2mModel {
    type Err = Lwm2mError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

fn object(
    id: u16,
    name: &str,
    multiple: bool,
    resources: Vec<(u16, &str, Operations, bool, ResourceType)>,
) -> ObjectSpec {
    ObjectSpec {
        id,
        name: name.to_string(),
        multiple,
        mandatory: true,
        resources: resources
            .into_iter()
            .map(|(id, name, operations, multiple, kind)| {
                (
                    id,
                    ResourceSpec {
                        id,
                        name: name.to_string(),
                        operations,
                        multiple,
                        mandatory: false,
                        kind,
                    },
                )
            })
            .collect(),
    }
}

fn core_objects() -> Vec<ObjectSpec> {
    use Operations as Op;
    use ResourceType as T;

    vec![
        object(
            0,
            "LWM2M Security",
            true,
            vec![
                (0, "LWM2M Server URI", Op::default(), false, T::String),
                (1, "Bootstrap Server", Op::default(), false, T::Boolean),
                (2, "Security Mode", Op::default(), false, T::Integer),
                (3, "Public Key or Identity", Op::default(), false, T::Opaque),
                (4, "Server Public Key or Identity", Op::default(), false, T::Opaque),
                (5, "Secret Key", Op::default(), false, T::Opaque),
                (6, "SMS Security Mode", Op::default(), false, T::Integer),
                (7, "SMS Binding Key Parameters", Op::default(), false, T::Opaque),
                (8, "SMS Binding Secret Keys", Op::default(), false, T::Opaque),
                (9, "LWM2M Server SMS Number", Op::default(), false, T::String),
                (10, "Short Server ID", Op::default(), false, T::Integer),
                (11, "Client Hold Off Time", Op::default(), false, T::Integer),
            ],
        ),
        object(
            1,
            "LWM2M Server",
            true,
            vec![
                (0, "Short Server ID", Op::R, false, T::Integer),
                (1, "Lifetime", Op::RW, false, T::Integer),
                (2, "Default Minimum Period", Op::RW, false, T::Integer),
                (3, "Default Maximum Period", Op::RW, false, T::Integer),
                (4, "Disable", Op::E, false, T::None),
                (5, "Disable Timeout", Op::RW, false, T::Integer),
                (6, "Notification Storing When Disabled or Offline", Op::RW, false, T::Boolean),
                (7, "Binding", Op::RW, false, T::String),
                (8, "Registration Update Trigger", Op::E, false, T::None),
            ],
        ),
        object(
            3,
            "Device",
            false,
            vec![
                (0, "Manufacturer", Op::R, false, T::String),
                (1, "Model Number", Op::R, false, T::String),
                (2, "Serial Number", Op::R, false, T::String),
                (3, "Firmware Version", Op::R, false, T::String),
                (4, "Reboot", Op::E, false, T::None),
                (5, "Factory Reset", Op::E, false, T::None),
                (6, "Available Power Sources", Op::R, true, T::Integer),
                (7, "Power Source Voltage", Op::R, true, T::Integer),
                (8, "Power Source Current", Op::R, true, T::Integer),
                (9, "Battery Level", Op::R, false, T::Integer),
                (10, "Memory Free", Op::R, false, T::Integer),
                (11, "Error Code", Op::R, true, T::Integer),
                (12, "Reset Error Code", Op::E, false, T::None),
                (13, "Current Time", Op::RW, false, T::Time),
                (14, "UTC Offset", Op::RW, false, T::String),
                (15, "Timezone", Op::RW, false, T::String),
                (16, "Supported Binding and Modes", Op::R, false, T::String),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MODEL: &str = r#"[
        {
            "id": 3303, "name": "Temperature", "instancetype": "multiple", "mandatory": false,
            "resourcedefs": [
                {"id": 5700, "name": "Sensor Value", "operations": "R", "instancetype": "single", "mandatory": true, "type": "float"},
                {"id": 5701, "name": "Sensor Units", "operations": "R", "instancetype": "single", "type": "string"},
                {"id": 5605, "name": "Reset Min and Max", "operations": "E", "type": ""}
            ]
        }
    ]"#;

    #[test]
    fn test_parse_model() {
        let model: Lwm2mModel = SAMPLE_MODEL.parse().unwrap();
        let object = model.object_spec(3303).unwrap();

        assert_eq!(object.name, "Temperature");
        assert!(object.multiple);
        assert_eq!(model.resource_type(3303, 5700), Some(ResourceType::Float));
        assert_eq!(model.resource_type(3303, 5605), Some(ResourceType::None));
        assert_eq!(
            model.resource_spec(3303, 5605).unwrap().operations,
            Operations::E
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Lwm2mModel::from_json_str(
            r#"[{"id": 9, "name": "x", "resourcedefs": [{"id": 0, "name": "y", "operations": "R", "type": "quaternion"}]}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, Lwm2mError::InvalidModel(_)));
    }

    #[test]
    fn test_core_model() {
        let model = Lwm2mModel::core();

        assert_eq!(model.resource_type(3, 0), Some(ResourceType::String));
        assert_eq!(model.resource_type(3, 9), Some(ResourceType::Integer));
        assert!(model.resource_spec(3, 6).unwrap().multiple);
        assert_eq!(model.resource_type(0, 3), Some(ResourceType::Opaque));
        assert_eq!(model.resource_type(3, 999), None);
    }

    #[test]
    fn test_merge_keeps_core_objects() {
        let custom: Lwm2mModel = SAMPLE_MODEL.parse().unwrap();
        let model = Lwm2mModel::core().merge(custom);

        assert!(model.object_spec(3).is_some());
        assert!(model.object_spec(3303).is_some());
    }

    #[test]
    fn test_model_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.json");
        std::fs::write(&path, SAMPLE_MODEL).unwrap();

        let model = Lwm2mModel::from_file(&path).unwrap();
        assert_eq!(model.resource_type(3303, 5701), Some(ResourceType::String));
    }
}
