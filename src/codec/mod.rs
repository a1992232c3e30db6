//! Node codecs
//!
//! Encode and decode [`Lwm2mNode`] values for every LWM2M content format.
//! Decoding is driven by the target path: the path tier decides which node
//! shape the payload must hold, and the [`Lwm2mModel`] decides value types.

mod cbor;
mod json;
mod text;
mod tlv;

use crate::coap_types::ContentFormat;
use crate::error::{Lwm2mError, Result};
use crate::model::{Lwm2mModel, ResourceType};
use crate::node::{Lwm2mNode, Resource, ResourceValue, Value};
use crate::path::Lwm2mPath;

/// Encoder/decoder for LWM2M node payloads
#[derive(Debug, Clone, Default)]
pub struct NodeCodec {
    /// Object definitions used to type raw values
    model: Lwm2mModel,
}

impl NodeCodec {
    /// Create a codec typing values with the given model
    pub fn new(model: Lwm2mModel) -> Self {
        Self { model }
    }

    /// Get the object model
    pub fn model(&self) -> &Lwm2mModel {
        &self.model
    }

    /// Decode `content` as the node found at `path`
    pub fn decode(
        &self,
        content: &[u8],
        format: ContentFormat,
        path: &Lwm2mPath,
    ) -> Result<Lwm2mNode> {
        if path.is_root() {
            return Err(Lwm2mError::invalid_value(
                "no value can be decoded for the root path",
                path,
            ));
        }

        let node = match format {
            ContentFormat::Tlv => tlv::decode(content, path, &self.model)?,
            ContentFormat::Json => json::decode(content, path, &self.model)?,
            ContentFormat::Text => {
                let (id, kind) = self.single_target(path, format)?;
                Resource::single(id, text::decode(content, kind, path)?).into()
            }
            ContentFormat::Cbor => {
                let (id, kind) = self.single_target(path, format)?;
                Resource::single(id, cbor::decode(content, kind, path)?).into()
            }
            ContentFormat::Opaque => {
                let (id, kind) = self.single_target(path, format)?;
                if !matches!(kind, None | Some(ResourceType::Opaque)) {
                    return Err(Lwm2mError::invalid_value(
                        "opaque content for a resource that is not opaque",
                        path,
                    ));
                }
                Resource::single(id, Value::Opaque(content.to_vec())).into()
            }
            ContentFormat::Link => {
                return Err(Lwm2mError::UnsupportedContentFormat(format.as_u16()));
            }
        };

        if !node.matches_tier(path) {
            return Err(Lwm2mError::invalid_value(
                format!("decoded {:?} does not match the path", node.kind()),
                path,
            ));
        }
        Ok(node)
    }

    /// Decode using a raw content-format code
    pub fn decode_raw(&self, content: &[u8], format: u16, path: &Lwm2mPath) -> Result<Lwm2mNode> {
        let format =
            ContentFormat::from_u16(format).ok_or(Lwm2mError::UnsupportedContentFormat(format))?;
        self.decode(content, format, path)
    }

    /// Encode a node; single-value formats only accept single resources
    pub fn encode(&self, node: &Lwm2mNode, format: ContentFormat) -> Result<Vec<u8>> {
        match format {
            ContentFormat::Tlv => tlv::encode(node),
            ContentFormat::Json => json::encode(node),
            ContentFormat::Text => text::encode(single_value(node, format)?),
            ContentFormat::Cbor => cbor::encode(single_value(node, format)?),
            ContentFormat::Opaque => match single_value(node, format)? {
                Value::Opaque(bytes) => Ok(bytes.clone()),
                other => Err(Lwm2mError::invalid_value(
                    format!("{:?} is not opaque", other.resource_type()),
                    node.id(),
                )),
            },
            ContentFormat::Link => Err(Lwm2mError::UnsupportedContentFormat(format.as_u16())),
        }
    }

    /// Resource id and model type for single-value formats
    fn single_target(
        &self,
        path: &Lwm2mPath,
        format: ContentFormat,
    ) -> Result<(u16, Option<ResourceType>)> {
        match (path.object_id(), path.resource_id()) {
            (Some(object_id), Some(resource_id)) => {
                let spec = self.model.resource_spec(object_id, resource_id);
                if spec.is_some_and(|s| s.multiple) {
                    return Err(Lwm2mError::invalid_value(
                        format!("{} cannot hold a multiple resource", format),
                        path,
                    ));
                }
                Ok((resource_id, spec.map(|s| s.kind)))
            }
            _ => Err(Lwm2mError::invalid_value(
                format!("{} only carries single resource values", format),
                path,
            )),
        }
    }
}

fn single_value(node: &Lwm2mNode, format: ContentFormat) -> Result<&Value> {
    match node {
        Lwm2mNode::Resource(Resource {
            value: ResourceValue::Single(value),
            ..
        }) => Ok(value),
        _ => Err(Lwm2mError::invalid_value(
            format!("{} only carries single resource values", format),
            node.id(),
        )),
    }
}

/// Type of a resource according to the model, when the path names an object
pub(crate) fn model_type(
    model: &Lwm2mModel,
    object_id: Option<u16>,
    resource_id: u16,
) -> Option<ResourceType> {
    object_id.and_then(|o| model.resource_type(o, resource_id))
}
