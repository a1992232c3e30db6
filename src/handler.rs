//! Device-side request handling
//!
//! Transport-agnostic: feed a [`DownlinkRequest`] to [`RequestHandler::handle`]
//! and send the returned [`RawResponse`] back with any CoAP server.

use std::fmt;

use tracing::{debug, warn};

use crate::codec::NodeCodec;
use crate::coap_types::{CoapCode, ContentFormat, RawResponse, ResponseCode};
use crate::error::Lwm2mError;
use crate::link;
use crate::node::{Lwm2mNode, Object, ObjectInstance, Resource, ResourceValue, Value};
use crate::path::{Lwm2mPath, PathTier};
use crate::request::{AttributeSet, DownlinkRequest};
use crate::tree::ObjectTree;

/// Result of a resource operation; the error is the response code to send
pub type Outcome<T> = std::result::Result<T, ResponseCode>;

/// Capabilities of a device resource
///
/// Every capability defaults to METHOD_NOT_ALLOWED.
pub trait ResourceHandler: Send {
    fn read(&self) -> Outcome<ResourceValue> {
        Err(ResponseCode::MethodNotAllowed)
    }

    fn write(&mut self, _value: ResourceValue) -> Outcome<()> {
        Err(ResponseCode::MethodNotAllowed)
    }

    fn execute(&mut self, _arguments: Option<&str>) -> Outcome<()> {
        Err(ResponseCode::MethodNotAllowed)
    }
}

/// A resource holding its value in memory
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    value: ResourceValue,
    writable: bool,
}

impl StoredResource {
    pub fn read_only(value: impl Into<Value>) -> Self {
        Self {
            value: ResourceValue::Single(value.into()),
            writable: false,
        }
    }

    pub fn read_write(value: impl Into<Value>) -> Self {
        Self {
            value: ResourceValue::Single(value.into()),
            writable: true,
        }
    }

    pub fn new(value: ResourceValue, writable: bool) -> Self {
        Self { value, writable }
    }

    pub fn value(&self) -> &ResourceValue {
        &self.value
    }

    pub fn boxed(self) -> Box<dyn ResourceHandler> {
        Box::new(self)
    }
}

impl ResourceHandler for StoredResource {
    fn read(&self) -> Outcome<ResourceValue> {
        Ok(self.value.clone())
    }

    fn write(&mut self, value: ResourceValue) -> Outcome<()> {
        if !self.writable {
            return Err(ResponseCode::MethodNotAllowed);
        }
        self.value = value;
        Ok(())
    }
}

type Action = Box<dyn FnMut(Option<&str>) -> Outcome<()> + Send>;

/// An executable resource backed by a closure
pub struct ExecutableResource {
    action: Action,
}

impl ExecutableResource {
    pub fn new(action: impl FnMut(Option<&str>) -> Outcome<()> + Send + 'static) -> Self {
        Self {
            action: Box::new(action),
        }
    }

    pub fn boxed(self) -> Box<dyn ResourceHandler> {
        Box::new(self)
    }
}

impl ResourceHandler for ExecutableResource {
    fn execute(&mut self, arguments: Option<&str>) -> Outcome<()> {
        (self.action)(arguments)
    }
}

impl fmt::Debug for ExecutableResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableResource").finish_non_exhaustive()
    }
}

/// Main LWM2M device request handler
///
/// Serves inbound operations from an [`ObjectTree`] and encodes content with
/// the configured format (TLV by default).
///
/// # Example
/// ```ignore
/// let mut handler = RequestHandler::new(tree, NodeCodec::default());
/// let response = handler.handle(&request);
/// // Send response via your CoAP transport
/// ```
#[derive(Debug)]
pub struct RequestHandler {
    tree: ObjectTree,
    codec: NodeCodec,
    format: ContentFormat,
    /// Sequence number of the next observe answer
    observe_sequence: u32,
}

impl RequestHandler {
    pub fn new(tree: ObjectTree, codec: NodeCodec) -> Self {
        Self {
            tree,
            codec,
            format: ContentFormat::Tlv,
            observe_sequence: 0,
        }
    }

    /// Use another content format for Read and Observe answers
    pub fn with_format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ObjectTree {
        &mut self.tree
    }

    /// Handle an incoming LWM2M request
    pub fn handle(&mut self, request: &DownlinkRequest) -> RawResponse {
        debug!("Handling {}", request);
        let result = match request {
            DownlinkRequest::Read { path } => self.handle_read(path),
            DownlinkRequest::Observe { path } => self.handle_read(path).map(|response| {
                self.observe_sequence = self.observe_sequence.wrapping_add(1);
                response.with_observe(self.observe_sequence)
            }),
            DownlinkRequest::Discover { path } => self.handle_discover(path),
            DownlinkRequest::Write {
                path,
                node,
                replace,
                ..
            } => self.handle_write(path, node, *replace),
            DownlinkRequest::WriteAttributes { path, attributes } => {
                self.handle_write_attributes(path, attributes)
            }
            DownlinkRequest::Execute { path, arguments } => {
                self.handle_execute(path, arguments.as_deref())
            }
            DownlinkRequest::Create { path, instance, .. } => self.handle_create(path, instance),
            DownlinkRequest::Delete { path } => self.handle_delete(path),
        };

        result.unwrap_or_else(|code| RawResponse::new(code.to_coap()))
    }

    fn read_resource(&self, path: &Lwm2mPath) -> Outcome<Resource> {
        let handler = self.tree.resource(path).ok_or(ResponseCode::NotFound)?;
        let id = path.resource_id().ok_or(ResponseCode::BadRequest)?;
        Ok(Resource {
            id,
            value: handler.read()?,
        })
    }

    /// Readable resources of an instance; resources without read capability are left out
    fn read_instance(&self, object_id: u16, instance_id: u16) -> Outcome<ObjectInstance> {
        if self.tree.instance_key(object_id, instance_id).is_none() {
            return Err(ResponseCode::NotFound);
        }

        let mut resources = Vec::new();
        for id in self.tree.resource_ids(object_id, instance_id) {
            match self.read_resource(&Lwm2mPath::resource(object_id, instance_id, id)) {
                Ok(resource) => resources.push(resource),
                Err(ResponseCode::MethodNotAllowed) => {}
                Err(code) => return Err(code),
            }
        }
        Ok(ObjectInstance::new(instance_id, resources))
    }

    fn read_node(&self, path: &Lwm2mPath) -> Outcome<Lwm2mNode> {
        match (path.object_id(), path.instance_id()) {
            _ if path.is_resource() => self.read_resource(path).map(Lwm2mNode::from),
            (Some(object_id), Some(instance_id)) => {
                self.read_instance(object_id, instance_id).map(Lwm2mNode::from)
            }
            (Some(object_id), None) => {
                if !self.tree.has_object(object_id) {
                    return Err(ResponseCode::NotFound);
                }
                let instances = self
                    .tree
                    .instance_ids(object_id)
                    .into_iter()
                    .map(|id| self.read_instance(object_id, id))
                    .collect::<Outcome<Vec<_>>>()?;
                Ok(Object::new(object_id, instances).into())
            }
            _ => Err(ResponseCode::MethodNotAllowed),
        }
    }

    fn handle_read(&self, path: &Lwm2mPath) -> Outcome<RawResponse> {
        let node = self.read_node(path)?;
        let payload = self.codec.encode(&node, self.format).map_err(|e| {
            warn!("Unable to encode {}: {}", path, e);
            ResponseCode::BadRequest
        })?;
        Ok(RawResponse::content(payload, self.format))
    }

    fn handle_discover(&self, path: &Lwm2mPath) -> Outcome<RawResponse> {
        let links = match (path.tier(), path.object_id(), path.instance_id()) {
            (PathTier::Object, Some(o), _) => self.tree.object_links(o),
            (PathTier::Instance, Some(o), Some(i)) => self.tree.instance_links(o, i),
            (PathTier::Resource, _, _) => self.tree.resource_links(path),
            _ => return Err(ResponseCode::MethodNotAllowed),
        }
        .map_err(|_| ResponseCode::NotFound)?;

        Ok(RawResponse::content(
            link::serialize(&links).into_bytes(),
            ContentFormat::Link,
        ))
    }

    fn write_resource(&mut self, path: &Lwm2mPath, value: ResourceValue, replace: bool) -> Outcome<()> {
        let handler = self.tree.resource_mut(path).ok_or(ResponseCode::NotFound)?;
        let value = match value {
            // partial update of a multiple resource keeps the other instances
            ResourceValue::Multiple(values) if !replace => match handler.read() {
                Ok(ResourceValue::Multiple(mut current)) => {
                    current.extend(values);
                    ResourceValue::Multiple(current)
                }
                _ => ResourceValue::Multiple(values),
            },
            value => value,
        };
        handler.write(value)
    }

    /// Write every resource of `instance`, or none of them
    ///
    /// Targets are checked before anything changes. When a write fails, the
    /// resources already written get their previous value back.
    fn write_instance(
        &mut self,
        object_id: u16,
        instance_id: u16,
        instance: &ObjectInstance,
        replace: bool,
    ) -> Outcome<()> {
        let mut previous = Vec::with_capacity(instance.resources.len());
        for resource in instance.resources.values() {
            let path = Lwm2mPath::resource(object_id, instance_id, resource.id);
            let handler = self.tree.resource(&path).ok_or(ResponseCode::NotFound)?;
            previous.push((path, handler.read().ok()));
        }

        for (index, resource) in instance.resources.values().enumerate() {
            let path = previous[index].0;
            if let Err(code) = self.write_resource(&path, resource.value.clone(), replace) {
                for (path, value) in previous[..index].iter().rev() {
                    let restored = match (self.tree.resource_mut(path), value) {
                        (Some(handler), Some(value)) => handler.write(value.clone()).is_ok(),
                        _ => false,
                    };
                    if !restored {
                        warn!("Unable to restore {} after failed write", path);
                    }
                }
                return Err(code);
            }
        }
        Ok(())
    }

    fn handle_write(&mut self, path: &Lwm2mPath, node: &Lwm2mNode, replace: bool) -> Outcome<RawResponse> {
        if !node.matches_tier(path) {
            return Err(ResponseCode::BadRequest);
        }

        match (node, path.object_id(), path.instance_id()) {
            (Lwm2mNode::Resource(resource), _, _) => {
                self.write_resource(path, resource.value.clone(), replace)?;
            }
            (Lwm2mNode::Instance(instance), Some(object_id), Some(instance_id)) => {
                if self.tree.instance_key(object_id, instance_id).is_none() {
                    return Err(ResponseCode::NotFound);
                }
                self.write_instance(object_id, instance_id, instance, replace)?;
            }
            _ => return Err(ResponseCode::MethodNotAllowed),
        }
        Ok(RawResponse::new(CoapCode::CHANGED))
    }

    fn handle_write_attributes(&mut self, path: &Lwm2mPath, attributes: &AttributeSet) -> Outcome<RawResponse> {
        attributes.validate().map_err(|_| ResponseCode::BadRequest)?;
        self.tree
            .set_attributes(*path, attributes)
            .map_err(|e| match e {
                Lwm2mError::NotFound(_) => ResponseCode::NotFound,
                _ => ResponseCode::BadRequest,
            })?;
        Ok(RawResponse::new(CoapCode::CHANGED))
    }

    fn handle_execute(&mut self, path: &Lwm2mPath, arguments: Option<&str>) -> Outcome<RawResponse> {
        let handler = self.tree.resource_mut(path).ok_or(ResponseCode::NotFound)?;
        handler.execute(arguments)?;
        Ok(RawResponse::new(CoapCode::CHANGED))
    }

    fn handle_create(&mut self, path: &Lwm2mPath, instance: &ObjectInstance) -> Outcome<RawResponse> {
        let object_id = path.object_id().ok_or(ResponseCode::BadRequest)?;
        if !self.tree.has_object(object_id) {
            return Err(ResponseCode::NotFound);
        }

        let resources = instance.resources.values().map(|r| {
            let handler: Box<dyn ResourceHandler> =
                StoredResource::new(r.value.clone(), true).boxed();
            (r.id, handler)
        });
        self.tree
            .add_instance(object_id, instance.id, resources)
            .map_err(|_| ResponseCode::BadRequest)?;

        Ok(RawResponse::new(CoapCode::CREATED)
            .with_location_path(format!("{}/{}", object_id, instance.id)))
    }

    fn handle_delete(&mut self, path: &Lwm2mPath) -> Outcome<RawResponse> {
        match (path.object_id(), path.instance_id()) {
            (Some(object_id), Some(instance_id)) if path.is_instance() => {
                self.tree
                    .delete_instance(object_id, instance_id)
                    .map_err(|_| ResponseCode::NotFound)?;
                Ok(RawResponse::new(CoapCode::DELETED))
            }
            _ => Err(ResponseCode::MethodNotAllowed),
        }
    }
}
