//! CBOR format for single resource values

use ciborium::Value as CborValue;

use crate::error::{Lwm2mError, Result};
use crate::model::ResourceType;
use crate::node::Value;
use crate::path::Lwm2mPath;

/// CBOR tag for epoch-based date/time
const TAG_EPOCH_TIME: u64 = 1;

fn as_i64(value: &CborValue) -> Option<i64> {
    match value {
        CborValue::Integer(n) => i64::try_from(*n).ok(),
        CborValue::Tag(TAG_EPOCH_TIME, inner) => as_i64(inner),
        _ => None,
    }
}

pub(super) fn decode(content: &[u8], kind: Option<ResourceType>, path: &Lwm2mPath) -> Result<Value> {
    let cbor: CborValue =
        ciborium::from_reader(content).map_err(|e| Lwm2mError::CborDecode(e.to_string()))?;

    let value = match (kind, &cbor) {
        (Some(ResourceType::String), CborValue::Text(s)) => Some(Value::String(s.clone())),
        (Some(ResourceType::Integer), v) => as_i64(v).map(Value::Integer),
        (Some(ResourceType::Time), v) => as_i64(v).map(Value::Time),
        (Some(ResourceType::Float), CborValue::Float(f)) => Some(Value::Float(*f)),
        (Some(ResourceType::Float), v) => as_i64(v).map(|n| Value::Float(n as f64)),
        (Some(ResourceType::Boolean), CborValue::Bool(b)) => Some(Value::Boolean(*b)),
        (Some(ResourceType::Opaque), CborValue::Bytes(b)) => Some(Value::Opaque(b.clone())),
        (Some(ResourceType::ObjectLink), CborValue::Text(s)) => s
            .split_once(':')
            .and_then(|(o, i)| Some(Value::ObjectLink(o.parse().ok()?, i.parse().ok()?))),
        (Some(ResourceType::None) | None, v) => untyped(v),
        _ => None,
    };

    value.ok_or_else(|| {
        Lwm2mError::invalid_value(format!("CBOR value does not fit a {:?} resource", kind), path)
    })
}

fn untyped(cbor: &CborValue) -> Option<Value> {
    match cbor {
        CborValue::Text(s) => Some(Value::String(s.clone())),
        CborValue::Integer(_) => as_i64(cbor).map(Value::Integer),
        CborValue::Tag(TAG_EPOCH_TIME, _) => as_i64(cbor).map(Value::Time),
        CborValue::Float(f) => Some(Value::Float(*f)),
        CborValue::Bool(b) => Some(Value::Boolean(*b)),
        CborValue::Bytes(b) => Some(Value::Opaque(b.clone())),
        _ => None,
    }
}

pub(super) fn encode(value: &Value) -> Result<Vec<u8>> {
    let cbor = match value {
        Value::String(s) => CborValue::Text(s.clone()),
        Value::Integer(n) | Value::Time(n) => CborValue::Integer((*n).into()),
        Value::Float(f) => CborValue::Float(*f),
        Value::Boolean(b) => CborValue::Bool(*b),
        Value::Opaque(bytes) => CborValue::Bytes(bytes.clone()),
        Value::ObjectLink(o, i) => CborValue::Text(format!("{}:{}", o, i)),
    };

    let mut bytes = Vec::new();
    ciborium::into_writer(&cbor, &mut bytes).map_err(|e| Lwm2mError::CborEncode(e.to_string()))?;
    Ok(bytes)
}
