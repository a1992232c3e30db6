//! OMA LWM2M JSON format
//!
//! ```json
//! {"bn":"/3/0/","e":[{"n":"0","sv":"Acme Corp"},{"n":"6/0","v":1}]}
//! ```
//!
//! Entry names are relative to `bn` when present, otherwise to the target path.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use super::model_type;
use crate::error::{Lwm2mError, Result};
use crate::model::{Lwm2mModel, ResourceType};
use crate::node::{Lwm2mNode, Object, ObjectInstance, Resource, ResourceValue, Value};
use crate::path::{Lwm2mPath, PathTier};

#[derive(Debug, Serialize, Deserialize)]
struct JsonRoot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bt: Option<i64>,
    #[serde(default)]
    e: Vec<JsonEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bv: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ov: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<i64>,
}

fn segments(text: &str, path: &Lwm2mPath) -> Result<Vec<u16>> {
    text.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|_| {
                Lwm2mError::invalid_value(format!("invalid name segment '{}'", s), path)
            })
        })
        .collect()
}

fn path_segments(path: &Lwm2mPath) -> Vec<u16> {
    [path.object_id(), path.instance_id(), path.resource_id()]
        .into_iter()
        .flatten()
        .collect()
}

/// Resource content collected while walking the entries
#[derive(Default)]
struct Collected {
    single: Option<Value>,
    instances: BTreeMap<u16, Value>,
}

impl Collected {
    fn into_resource(self, id: u16, path: &Lwm2mPath) -> Result<Resource> {
        match (self.single, self.instances.is_empty()) {
            (Some(value), true) => Ok(Resource::single(id, value)),
            (None, false) => Ok(Resource::multiple(id, self.instances)),
            (Some(_), false) => Err(Lwm2mError::invalid_value(
                format!("resource {} is both single and multiple", id),
                path,
            )),
            (None, true) => Ok(Resource::multiple(id, BTreeMap::new())),
        }
    }
}

pub(super) fn decode(content: &[u8], path: &Lwm2mPath, model: &Lwm2mModel) -> Result<Lwm2mNode> {
    let root: JsonRoot = serde_json::from_slice(content)
        .map_err(|e| Lwm2mError::invalid_value(format!("invalid JSON: {}", e), path))?;

    let target = path_segments(path);
    let base = match &root.bn {
        Some(bn) => segments(bn, path)?,
        None => target.clone(),
    };

    let mut tree: BTreeMap<u16, BTreeMap<u16, Collected>> = BTreeMap::new();
    for entry in &root.e {
        let mut full = base.clone();
        if let Some(name) = &entry.n {
            full.extend(segments(name, path)?);
        }
        if !full.starts_with(&target) || !(3..=4).contains(&full.len()) {
            return Err(Lwm2mError::invalid_value(
                format!("entry '{}' is outside the target", entry.n.as_deref().unwrap_or("")),
                path,
            ));
        }

        let kind = model_type(model, Some(full[0]), full[2]);
        let value = decode_value(entry, kind, path)?;
        let resource = tree.entry(full[1]).or_default().entry(full[2]).or_default();
        match full.get(3) {
            Some(ri) => {
                resource.instances.insert(*ri, value);
            }
            None => resource.single = Some(value),
        }
    }

    let mut instances = tree
        .into_iter()
        .map(|(id, resources)| {
            let resources = resources
                .into_iter()
                .map(|(rid, collected)| collected.into_resource(rid, path))
                .collect::<Result<Vec<_>>>()?;
            Ok(ObjectInstance::new(id, resources))
        })
        .collect::<Result<Vec<_>>>()?;

    match (path.tier(), path.instance_id(), path.resource_id()) {
        (PathTier::Object, _, _) => Ok(Object::new(target[0], instances).into()),
        (PathTier::Instance, Some(id), _) => Ok(instances
            .pop()
            .unwrap_or_else(|| ObjectInstance::new(id, []))
            .into()),
        (PathTier::Resource, Some(_), Some(id)) => {
            match instances.pop().and_then(|mut i| i.resources.remove(&id)) {
                Some(resource) => Ok(resource.into()),
                // an empty multiple resource has no entries at all
                None if model
                    .resource_spec(target[0], id)
                    .is_some_and(|spec| spec.multiple) =>
                {
                    Ok(Resource::multiple(id, BTreeMap::new()).into())
                }
                None => Err(Lwm2mError::invalid_value("no entry for the resource", path)),
            }
        }
        _ => Err(Lwm2mError::invalid_value(
            "no value can be decoded for the root path",
            path,
        )),
    }
}

fn decode_value(entry: &JsonEntry, kind: Option<ResourceType>, path: &Lwm2mPath) -> Result<Value> {
    let mismatch = || {
        Lwm2mError::invalid_value(
            format!("entry '{}' does not hold a {:?} value", entry.n.as_deref().unwrap_or(""), kind),
            path,
        )
    };

    let value = match kind {
        Some(ResourceType::String) => entry.sv.clone().map(Value::String),
        Some(ResourceType::Integer) => entry.v.as_ref().and_then(Number::as_i64).map(Value::Integer),
        Some(ResourceType::Time) => entry.v.as_ref().and_then(Number::as_i64).map(Value::Time),
        Some(ResourceType::Float) => entry.v.as_ref().and_then(Number::as_f64).map(Value::Float),
        Some(ResourceType::Boolean) => entry.bv.map(Value::Boolean),
        Some(ResourceType::Opaque) => match &entry.sv {
            Some(sv) => Some(Value::Opaque(BASE64.decode(sv).map_err(|e| {
                Lwm2mError::invalid_value(format!("base64 decode: {}", e), path)
            })?)),
            None => None,
        },
        Some(ResourceType::ObjectLink) => entry.ov.as_deref().map(|ov| parse_link(ov, path)).transpose()?,
        Some(ResourceType::None) | None => untyped(entry, path)?,
    };
    value.ok_or_else(mismatch)
}

fn untyped(entry: &JsonEntry, path: &Lwm2mPath) -> Result<Option<Value>> {
    if let Some(v) = &entry.v {
        return Ok(v
            .as_i64()
            .map(Value::Integer)
            .or_else(|| v.as_f64().map(Value::Float)));
    }
    if let Some(sv) = &entry.sv {
        return Ok(Some(Value::String(sv.clone())));
    }
    if let Some(bv) = entry.bv {
        return Ok(Some(Value::Boolean(bv)));
    }
    entry.ov.as_deref().map(|ov| parse_link(ov, path)).transpose()
}

fn parse_link(ov: &str, path: &Lwm2mPath) -> Result<Value> {
    let invalid = || Lwm2mError::invalid_value(format!("invalid object link '{}'", ov), path);
    let (object, instance) = ov.split_once(':').ok_or_else(invalid)?;
    Ok(Value::ObjectLink(
        object.parse().map_err(|_| invalid())?,
        instance.parse().map_err(|_| invalid())?,
    ))
}

fn encode_value(name: Option<String>, value: &Value) -> Result<JsonEntry> {
    let mut entry = JsonEntry {
        n: name,
        ..Default::default()
    };
    match value {
        Value::String(s) => entry.sv = Some(s.clone()),
        Value::Integer(n) | Value::Time(n) => entry.v = Some(Number::from(*n)),
        Value::Float(f) => {
            entry.v = Some(Number::from_f64(*f).ok_or_else(|| {
                Lwm2mError::invalid_value(format!("{} has no JSON representation", f), "float")
            })?)
        }
        Value::Boolean(b) => entry.bv = Some(*b),
        Value::Opaque(bytes) => entry.sv = Some(BASE64.encode(bytes)),
        Value::ObjectLink(o, i) => entry.ov = Some(format!("{}:{}", o, i)),
    }
    Ok(entry)
}

fn join(prefix: Option<&str>, id: u16) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, id),
        None => id.to_string(),
    }
}

fn encode_resource(out: &mut Vec<JsonEntry>, prefix: Option<&str>, resource: &Resource) -> Result<()> {
    match &resource.value {
        ResourceValue::Single(value) => {
            out.push(encode_value(prefix.map(str::to_string), value)?);
        }
        ResourceValue::Multiple(values) => {
            for (id, value) in values {
                out.push(encode_value(Some(join(prefix, *id)), value)?);
            }
        }
    }
    Ok(())
}

fn encode_instance(out: &mut Vec<JsonEntry>, prefix: Option<&str>, instance: &ObjectInstance) -> Result<()> {
    for resource in instance.resources.values() {
        let name = join(prefix, resource.id);
        encode_resource(out, Some(&name), resource)?;
    }
    Ok(())
}

pub(super) fn encode(node: &Lwm2mNode) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    match node {
        Lwm2mNode::Resource(resource) => encode_resource(&mut entries, None, resource)?,
        Lwm2mNode::Instance(instance) => encode_instance(&mut entries, None, instance)?,
        Lwm2mNode::Object(object) => {
            for instance in object.instances.values() {
                if instance.resources.is_empty() {
                    return Err(Lwm2mError::invalid_value(
                        "JSON cannot carry an instance without resources inside an object",
                        Lwm2mPath::instance(object.id, instance.id),
                    ));
                }
                let name = instance.id.to_string();
                encode_instance(&mut entries, Some(&name), instance)?;
            }
        }
    }

    let root = JsonRoot {
        bn: None,
        bt: None,
        e: entries,
    };
    serde_json::to_vec(&root).map_err(Lwm2mError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_core(content: &str, path: &str) -> Result<Lwm2mNode> {
        decode(content.as_bytes(), &path.parse().unwrap(), &Lwm2mModel::core())
    }

    #[test]
    fn test_decode_with_base_name() {
        let content = r#"{"bn":"/3/0/","e":[
            {"n":"0","sv":"Open Mobile Alliance"},
            {"n":"6/0","v":1},{"n":"6/1","v":5},
            {"n":"9","v":100},
            {"n":"13","v":1367491215}]}"#;

        let Lwm2mNode::Instance(instance) = decode_core(content, "/3/0").unwrap() else {
            panic!("expected an instance");
        };
        assert_eq!(instance.id, 0);
        assert_eq!(
            instance.resources[&0],
            Resource::single(0, "Open Mobile Alliance")
        );
        assert!(instance.resources[&6].is_multiple());
        assert_eq!(instance.resources[&9], Resource::single(9, 100i64));
        assert_eq!(
            instance.resources[&13],
            Resource::single(13, Value::Time(1_367_491_215))
        );
    }

    #[test]
    fn test_decode_resource_without_name() {
        let node = decode_core(r#"{"e":[{"sv":"Widget"}]}"#, "/3/0/1").unwrap();
        assert_eq!(node, Resource::single(1, "Widget").into());
    }

    #[test]
    fn test_encode_names_are_relative() {
        let node: Lwm2mNode = ObjectInstance::new(
            0,
            [
                Resource::single(1, "Widget"),
                Resource::multiple(6, BTreeMap::from([(1, Value::Integer(5))])),
            ],
        )
        .into();
        let encoded = String::from_utf8(encode(&node).unwrap()).unwrap();

        assert_eq!(
            encoded,
            r#"{"e":[{"n":"1","sv":"Widget"},{"n":"6/1","v":5}]}"#
        );
    }

    #[test]
    fn test_opaque_is_base64() {
        let node: Lwm2mNode = Resource::single(5, vec![0xde, 0xad, 0xbe, 0xef]).into();
        let encoded = String::from_utf8(encode(&node).unwrap()).unwrap();
        assert_eq!(encoded, r#"{"e":[{"sv":"3q2+7w=="}]}"#);
    }

    #[test]
    fn test_type_mismatch() {
        let err = decode_core(r#"{"e":[{"sv":"high"}]}"#, "/3/0/9").unwrap_err();
        assert!(matches!(err, Lwm2mError::InvalidValue { .. }));
    }

    #[test]
    fn test_entry_outside_target() {
        assert!(decode_core(r#"{"bn":"/3/1/","e":[{"n":"0","sv":"x"}]}"#, "/3/0").is_err());
    }

    #[test]
    fn test_untyped_object_link() {
        let node = decode(
            br#"{"e":[{"ov":"3:0"}]}"#,
            &Lwm2mPath::resource(9000, 0, 1),
            &Lwm2mModel::empty(),
        )
        .unwrap();
        assert_eq!(
            node,
            Resource::single(1, Value::ObjectLink(3, 0)).into()
        );
    }
}
