//! Plain text format for single resource values

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::{Lwm2mError, Result};
use crate::model::ResourceType;
use crate::node::Value;
use crate::path::Lwm2mPath;

pub(super) fn decode(content: &[u8], kind: Option<ResourceType>, path: &Lwm2mPath) -> Result<Value> {
    let text = std::str::from_utf8(content)
        .map_err(|_| Lwm2mError::invalid_value("text value is not UTF-8", path))?;
    let invalid = |what: &str| {
        Lwm2mError::invalid_value(format!("'{}' is not a valid {}", text, what), path)
    };

    match kind {
        Some(ResourceType::Integer) => text
            .trim()
            .parse()
            .map(Value::Integer)
            .map_err(|_| invalid("integer")),
        Some(ResourceType::Time) => text
            .trim()
            .parse()
            .map(Value::Time)
            .map_err(|_| invalid("time")),
        Some(ResourceType::Float) => text
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| invalid("float")),
        Some(ResourceType::Boolean) => match text.trim() {
            "1" | "true" => Ok(Value::Boolean(true)),
            "0" | "false" => Ok(Value::Boolean(false)),
            _ => Err(invalid("boolean")),
        },
        Some(ResourceType::Opaque) => BASE64
            .decode(text.trim())
            .map(Value::Opaque)
            .map_err(|_| invalid("base64 value")),
        Some(ResourceType::ObjectLink) => {
            let (object, instance) = text.trim().split_once(':').ok_or_else(|| invalid("object link"))?;
            Ok(Value::ObjectLink(
                object.parse().map_err(|_| invalid("object link"))?,
                instance.parse().map_err(|_| invalid("object link"))?,
            ))
        }
        Some(ResourceType::String) | Some(ResourceType::None) | None => {
            Ok(Value::String(text.to_string()))
        }
    }
}

pub(super) fn encode(value: &Value) -> Result<Vec<u8>> {
    let text = match value {
        Value::Boolean(b) => u8::from(*b).to_string(),
        Value::Opaque(bytes) => BASE64.encode(bytes),
        other => other.to_string(),
    };
    Ok(text.into_bytes())
}
