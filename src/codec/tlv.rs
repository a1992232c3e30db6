//! OMA LWM2M TLV format
//!
//! Each entry is a type byte, an 8 or 16 bit identifier, an optional length
//! field and the value. Bits 7-6 of the type byte select the entry kind, bit 5
//! the identifier width, bits 4-3 the length width and bits 2-0 hold short
//! lengths inline.

use std::collections::BTreeMap;

use super::model_type;
use crate::error::{Lwm2mError, Result};
use crate::model::{Lwm2mModel, ResourceType};
use crate::node::{Lwm2mNode, Object, ObjectInstance, Resource, ResourceValue, Value};
use crate::path::{Lwm2mPath, PathTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlvKind {
    ObjectInstance = 0b00,
    ResourceInstance = 0b01,
    MultipleResource = 0b10,
    ResourceValue = 0b11,
}

impl TlvKind {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::ObjectInstance,
            0b01 => Self::ResourceInstance,
            0b10 => Self::MultipleResource,
            _ => Self::ResourceValue,
        }
    }

    fn is_container(self) -> bool {
        matches!(self, Self::ObjectInstance | Self::MultipleResource)
    }
}

#[derive(Debug)]
struct Tlv<'a> {
    kind: TlvKind,
    id: u16,
    value: &'a [u8],
}

/// Parse a flat sequence of TLV entries
fn parse<'a>(mut content: &'a [u8], path: &Lwm2mPath) -> Result<Vec<Tlv<'a>>> {
    let truncated = || Lwm2mError::invalid_value("truncated TLV entry", path);
    let mut entries = Vec::new();

    while let Some((&type_byte, rest)) = content.split_first() {
        content = rest;
        let kind = TlvKind::from_bits(type_byte >> 6);

        let id = if type_byte & 0x20 != 0 {
            let (bytes, rest) = content.split_at_checked(2).ok_or_else(truncated)?;
            content = rest;
            u16::from_be_bytes([bytes[0], bytes[1]])
        } else {
            let (byte, rest) = content.split_first().ok_or_else(truncated)?;
            content = rest;
            u16::from(*byte)
        };

        let length_width = usize::from((type_byte >> 3) & 0b11);
        let length = if length_width == 0 {
            usize::from(type_byte & 0b111)
        } else {
            let (bytes, rest) = content.split_at_checked(length_width).ok_or_else(truncated)?;
            content = rest;
            bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
        };

        let (value, rest) = content.split_at_checked(length).ok_or_else(truncated)?;
        content = rest;
        entries.push(Tlv { kind, id, value });
    }

    Ok(entries)
}

fn write_entry(out: &mut Vec<u8>, kind: TlvKind, id: u16, value: &[u8]) -> Result<()> {
    let mut type_byte = (kind as u8) << 6;
    if id > 0xff {
        type_byte |= 0x20;
    }

    let length = value.len();
    let length_bytes: &[u8] = &(length as u32).to_be_bytes();
    let length_field = match length {
        0..=7 => {
            type_byte |= length as u8;
            &[][..]
        }
        8..=0xff => {
            type_byte |= 0b01 << 3;
            &length_bytes[3..]
        }
        0x100..=0xffff => {
            type_byte |= 0b10 << 3;
            &length_bytes[2..]
        }
        0x1_0000..=0xff_ffff => {
            type_byte |= 0b11 << 3;
            &length_bytes[1..]
        }
        _ => {
            return Err(Lwm2mError::invalid_value(
                format!("TLV value of {} bytes is too long", length),
                id,
            ));
        }
    };

    out.push(type_byte);
    if id > 0xff {
        out.extend_from_slice(&id.to_be_bytes());
    } else {
        out.push(id as u8);
    }
    out.extend_from_slice(length_field);
    out.extend_from_slice(value);
    Ok(())
}

pub(super) fn decode(content: &[u8], path: &Lwm2mPath, model: &Lwm2mModel) -> Result<Lwm2mNode> {
    let entries = parse(content, path)?;
    let object_id = path.object_id();

    match (path.tier(), path.instance_id(), path.resource_id()) {
        (PathTier::Object, _, _) => {
            let object_id = object_id.unwrap_or_default();
            let instances = if entries.iter().all(|e| e.kind == TlvKind::ObjectInstance) {
                entries
                    .iter()
                    .map(|e| {
                        let children = parse(e.value, path)?;
                        decode_instance(e.id, &children, Some(object_id), path, model)
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                // Single-instance objects may omit the instance wrapper
                vec![decode_instance(0, &entries, Some(object_id), path, model)?]
            };
            Ok(Object::new(object_id, instances).into())
        }
        (PathTier::Instance, Some(instance_id), _) => {
            let instance = match entries.as_slice() {
                [wrapper] if wrapper.kind == TlvKind::ObjectInstance => {
                    if wrapper.id != instance_id {
                        return Err(Lwm2mError::invalid_value(
                            format!("TLV holds instance {} instead", wrapper.id),
                            path,
                        ));
                    }
                    decode_instance(instance_id, &parse(wrapper.value, path)?, object_id, path, model)?
                }
                _ => decode_instance(instance_id, &entries, object_id, path, model)?,
            };
            Ok(instance.into())
        }
        (PathTier::Resource, _, Some(resource_id)) => {
            let kind = model_type(model, object_id, resource_id);
            let resource = match entries.as_slice() {
                [entry] if !matches!(entry.kind, TlvKind::ObjectInstance | TlvKind::ResourceInstance) => {
                    if entry.id != resource_id {
                        return Err(Lwm2mError::invalid_value(
                            format!("TLV holds resource {} instead", entry.id),
                            path,
                        ));
                    }
                    decode_resource(entry, kind, path)?
                }
                _ if entries.iter().all(|e| e.kind == TlvKind::ResourceInstance) => {
                    Resource::multiple(resource_id, decode_resource_instances(&entries, kind, path)?)
                }
                _ => {
                    return Err(Lwm2mError::invalid_value(
                        "expected a single resource TLV",
                        path,
                    ));
                }
            };
            Ok(resource.into())
        }
        _ => Err(Lwm2mError::invalid_value(
            "no value can be decoded for the root path",
            path,
        )),
    }
}

fn decode_instance(
    id: u16,
    entries: &[Tlv<'_>],
    object_id: Option<u16>,
    path: &Lwm2mPath,
    model: &Lwm2mModel,
) -> Result<ObjectInstance> {
    let mut resources = BTreeMap::new();
    for entry in entries {
        if !matches!(entry.kind, TlvKind::ResourceValue | TlvKind::MultipleResource) {
            return Err(Lwm2mError::invalid_value(
                format!("unexpected {:?} entry inside an object instance", entry.kind),
                path,
            ));
        }
        let kind = model_type(model, object_id, entry.id);
        resources.insert(entry.id, decode_resource(entry, kind, path)?);
    }
    Ok(ObjectInstance { id, resources })
}

fn decode_resource(entry: &Tlv<'_>, kind: Option<ResourceType>, path: &Lwm2mPath) -> Result<Resource> {
    if entry.kind == TlvKind::MultipleResource {
        let children = parse(entry.value, path)?;
        return Ok(Resource::multiple(
            entry.id,
            decode_resource_instances(&children, kind, path)?,
        ));
    }
    Ok(Resource::single(entry.id, decode_value(entry.value, kind, path)?))
}

fn decode_resource_instances(
    entries: &[Tlv<'_>],
    kind: Option<ResourceType>,
    path: &Lwm2mPath,
) -> Result<BTreeMap<u16, Value>> {
    entries
        .iter()
        .map(|e| {
            if e.kind != TlvKind::ResourceInstance {
                return Err(Lwm2mError::invalid_value(
                    format!("unexpected {:?} entry inside a multiple resource", e.kind),
                    path,
                ));
            }
            Ok((e.id, decode_value(e.value, kind, path)?))
        })
        .collect()
}

fn decode_integer(bytes: &[u8], path: &Lwm2mPath) -> Result<i64> {
    match bytes.len() {
        1 => Ok(i64::from(bytes[0] as i8)),
        2 => Ok(i64::from(i16::from_be_bytes([bytes[0], bytes[1]]))),
        4 => Ok(i64::from(i32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(i64::from_be_bytes(buf))
        }
        n => Err(Lwm2mError::invalid_value(
            format!("invalid length {} for an integer", n),
            path,
        )),
    }
}

fn decode_value(bytes: &[u8], kind: Option<ResourceType>, path: &Lwm2mPath) -> Result<Value> {
    match kind {
        Some(ResourceType::String) => String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|_| Lwm2mError::invalid_value("string value is not UTF-8", path)),
        Some(ResourceType::Integer) => decode_integer(bytes, path).map(Value::Integer),
        Some(ResourceType::Time) => decode_integer(bytes, path).map(Value::Time),
        Some(ResourceType::Float) => match bytes.len() {
            4 => Ok(Value::Float(f64::from(f32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))),
            8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Float(f64::from_be_bytes(buf)))
            }
            n => Err(Lwm2mError::invalid_value(
                format!("invalid length {} for a float", n),
                path,
            )),
        },
        Some(ResourceType::Boolean) => match bytes {
            [0] => Ok(Value::Boolean(false)),
            [1] => Ok(Value::Boolean(true)),
            _ => Err(Lwm2mError::invalid_value("invalid boolean value", path)),
        },
        Some(ResourceType::ObjectLink) => match bytes {
            [a, b, c, d] => Ok(Value::ObjectLink(
                u16::from_be_bytes([*a, *b]),
                u16::from_be_bytes([*c, *d]),
            )),
            _ => Err(Lwm2mError::invalid_value("invalid object link value", path)),
        },
        Some(ResourceType::Opaque) | Some(ResourceType::None) | None => {
            Ok(Value::Opaque(bytes.to_vec()))
        }
    }
}

fn encode_integer(n: i64) -> Vec<u8> {
    if let Ok(n) = i8::try_from(n) {
        n.to_be_bytes().to_vec()
    } else if let Ok(n) = i16::try_from(n) {
        n.to_be_bytes().to_vec()
    } else if let Ok(n) = i32::try_from(n) {
        n.to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Integer(n) | Value::Time(n) => encode_integer(*n),
        Value::Float(n) => n.to_be_bytes().to_vec(),
        Value::Boolean(b) => vec![u8::from(*b)],
        Value::Opaque(bytes) => bytes.clone(),
        Value::ObjectLink(o, i) => {
            let mut out = o.to_be_bytes().to_vec();
            out.extend_from_slice(&i.to_be_bytes());
            out
        }
    }
}

fn encode_resource(out: &mut Vec<u8>, resource: &Resource) -> Result<()> {
    match &resource.value {
        ResourceValue::Single(value) => {
            write_entry(out, TlvKind::ResourceValue, resource.id, &encode_value(value))
        }
        ResourceValue::Multiple(values) => {
            let mut inner = Vec::new();
            for (id, value) in values {
                write_entry(&mut inner, TlvKind::ResourceInstance, *id, &encode_value(value))?;
            }
            write_entry(out, TlvKind::MultipleResource, resource.id, &inner)
        }
    }
}

fn encode_resources(out: &mut Vec<u8>, instance: &ObjectInstance) -> Result<()> {
    for resource in instance.resources.values() {
        encode_resource(out, resource)?;
    }
    Ok(())
}

pub(super) fn encode(node: &Lwm2mNode) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match node {
        Lwm2mNode::Resource(resource) => encode_resource(&mut out, resource)?,
        Lwm2mNode::Instance(instance) => encode_resources(&mut out, instance)?,
        Lwm2mNode::Object(object) => {
            for instance in object.instances.values() {
                let mut inner = Vec::new();
                encode_resources(&mut inner, instance)?;
                write_entry(&mut out, TlvKind::ObjectInstance, instance.id, &inner)?;
            }
        }
    }
    Ok(out)
}
