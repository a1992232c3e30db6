//! Device-side resource tree
//!
//! Objects own instances, instances own resource handlers. Instances live in
//! an arena and keep the id of their parent object, so detaching one is a key
//! lookup in the parent rather than a back-reference.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Lwm2mError, Result};
use crate::handler::ResourceHandler;
use crate::link::{self, LinkObject};
use crate::path::Lwm2mPath;
use crate::request::AttributeSet;

/// Arena index of an object instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(usize);

struct InstanceSlot {
    /// Id of the owning object
    parent: u16,
    id: u16,
    resources: BTreeMap<u16, Box<dyn ResourceHandler>>,
}

/// In-memory tree of the objects a device exposes
#[derive(Default)]
pub struct ObjectTree {
    objects: BTreeMap<u16, BTreeMap<u16, InstanceKey>>,
    slots: Vec<Option<InstanceSlot>>,
    free: Vec<usize>,
    /// Write-Attributes values per path
    attributes: HashMap<Lwm2mPath, AttributeSet>,
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an object, possibly without instances
    pub fn add_object(&mut self, object_id: u16) {
        self.objects.entry(object_id).or_default();
    }

    /// Add an instance with its resource handlers
    pub fn add_instance(
        &mut self,
        object_id: u16,
        instance_id: u16,
        resources: impl IntoIterator<Item = (u16, Box<dyn ResourceHandler>)>,
    ) -> Result<InstanceKey> {
        let instances = self.objects.entry(object_id).or_default();
        if instances.contains_key(&instance_id) {
            return Err(Lwm2mError::invalid_value(
                "instance already exists",
                Lwm2mPath::instance(object_id, instance_id),
            ));
        }

        let slot = InstanceSlot {
            parent: object_id,
            id: instance_id,
            resources: resources.into_iter().collect(),
        };
        let key = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                InstanceKey(index)
            }
            None => {
                self.slots.push(Some(slot));
                InstanceKey(self.slots.len() - 1)
            }
        };
        instances.insert(instance_id, key);
        Ok(key)
    }

    pub fn has_object(&self, object_id: u16) -> bool {
        self.objects.contains_key(&object_id)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.objects.keys().copied()
    }

    pub fn instance_ids(&self, object_id: u16) -> Vec<u16> {
        self.objects
            .get(&object_id)
            .map(|instances| instances.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn instance_key(&self, object_id: u16, instance_id: u16) -> Option<InstanceKey> {
        self.objects.get(&object_id)?.get(&instance_id).copied()
    }

    /// Smallest instance id not used under `object_id`
    pub fn next_instance_id(&self, object_id: u16) -> Option<u16> {
        let used = self.objects.get(&object_id);
        (0..u16::MAX).find(|id| used.is_none_or(|instances| !instances.contains_key(id)))
    }

    fn slot(&self, key: InstanceKey) -> Option<&InstanceSlot> {
        self.slots.get(key.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, key: InstanceKey) -> Option<&mut InstanceSlot> {
        self.slots.get_mut(key.0).and_then(Option::as_mut)
    }

    /// Path of an attached instance
    pub fn instance_path(&self, key: InstanceKey) -> Option<Lwm2mPath> {
        self.slot(key)
            .map(|slot| Lwm2mPath::instance(slot.parent, slot.id))
    }

    /// Detach an instance from its owning object
    ///
    /// Fails when the instance is no longer attached.
    pub fn detach(&mut self, key: InstanceKey) -> Result<()> {
        let slot = self
            .slots
            .get_mut(key.0)
            .and_then(Option::take)
            .ok_or_else(|| Lwm2mError::NotFound(format!("instance {:?}", key)))?;

        if let Some(instances) = self.objects.get_mut(&slot.parent) {
            instances.remove(&slot.id);
        }
        let path = Lwm2mPath::instance(slot.parent, slot.id);
        self.attributes
            .retain(|p, _| p.object_id() != path.object_id() || p.instance_id() != path.instance_id());
        self.free.push(key.0);
        Ok(())
    }

    /// Delete `/object_id/instance_id`
    pub fn delete_instance(&mut self, object_id: u16, instance_id: u16) -> Result<()> {
        let key = self
            .instance_key(object_id, instance_id)
            .ok_or_else(|| Lwm2mError::NotFound(Lwm2mPath::instance(object_id, instance_id).to_string()))?;
        self.detach(key)
    }

    pub fn resource_ids(&self, object_id: u16, instance_id: u16) -> Vec<u16> {
        self.instance_key(object_id, instance_id)
            .and_then(|key| self.slot(key))
            .map(|slot| slot.resources.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Handler of the resource at `path`
    pub fn resource(&self, path: &Lwm2mPath) -> Option<&dyn ResourceHandler> {
        let key = self.instance_key(path.object_id()?, path.instance_id()?)?;
        self.slot(key)?
            .resources
            .get(&path.resource_id()?)
            .map(|r| r.as_ref())
    }

    pub fn resource_mut(&mut self, path: &Lwm2mPath) -> Option<&mut (dyn ResourceHandler + 'static)> {
        let key = self.instance_key(path.object_id()?, path.instance_id()?)?;
        let resource_id = path.resource_id()?;
        self.slot_mut(key)?
            .resources
            .get_mut(&resource_id)
            .map(|r| r.as_mut())
    }

    /// Whether the object, instance or resource at `path` exists
    pub fn contains(&self, path: &Lwm2mPath) -> bool {
        match (path.object_id(), path.instance_id(), path.resource_id()) {
            (Some(o), None, _) => self.has_object(o),
            (Some(o), Some(i), None) => self.instance_key(o, i).is_some(),
            (Some(_), Some(_), Some(_)) => self.resource(path).is_some(),
            _ => true,
        }
    }

    /// Store Write-Attributes values, overlaying any stored for the same path
    ///
    /// The combined set must be consistent; otherwise nothing is stored.
    pub fn set_attributes(&mut self, path: Lwm2mPath, attributes: &AttributeSet) -> Result<()> {
        if !self.contains(&path) {
            return Err(Lwm2mError::NotFound(path.to_string()));
        }
        let mut merged = self.attributes.get(&path).cloned().unwrap_or_default();
        merged.merge(attributes);
        merged.validate()?;
        self.attributes.insert(path, merged);
        Ok(())
    }

    pub fn attributes(&self, path: &Lwm2mPath) -> Option<&AttributeSet> {
        self.attributes.get(path)
    }

    fn link(&self, path: Lwm2mPath) -> LinkObject {
        let mut link = LinkObject::new(path.to_string());
        if let Some(attributes) = self.attributes.get(&path) {
            link.attributes = attributes.to_link_attributes();
        }
        link
    }

    /// Discovery links of a resource
    pub fn resource_links(&self, path: &Lwm2mPath) -> Result<Vec<LinkObject>> {
        if !path.is_resource() || self.resource(path).is_none() {
            return Err(Lwm2mError::NotFound(path.to_string()));
        }
        Ok(vec![self.link(*path)])
    }

    /// Discovery links of an instance: the instance, then each of its resources
    pub fn instance_links(&self, object_id: u16, instance_id: u16) -> Result<Vec<LinkObject>> {
        let path = Lwm2mPath::instance(object_id, instance_id);
        let slot = self
            .instance_key(object_id, instance_id)
            .and_then(|key| self.slot(key))
            .ok_or_else(|| Lwm2mError::NotFound(path.to_string()))?;

        let mut links = vec![self.link(path)];
        links.extend(
            slot.resources
                .keys()
                .map(|id| self.link(Lwm2mPath::resource(object_id, instance_id, *id))),
        );
        Ok(links)
    }

    /// Discovery links of an object: the object, then every instance's links
    pub fn object_links(&self, object_id: u16) -> Result<Vec<LinkObject>> {
        let instances = self
            .objects
            .get(&object_id)
            .ok_or_else(|| Lwm2mError::NotFound(Lwm2mPath::object(object_id).to_string()))?;

        let mut links = vec![self.link(Lwm2mPath::object(object_id))];
        for instance_id in instances.keys() {
            links.extend(self.instance_links(object_id, *instance_id)?);
        }
        Ok(links)
    }

    /// Link-format document of one instance
    pub fn as_link_format(&self, object_id: u16, instance_id: u16) -> Result<String> {
        Ok(link::serialize(&self.instance_links(object_id, instance_id)?))
    }

    /// Object and instance links announced when registering
    pub fn registration_links(&self) -> Vec<LinkObject> {
        self.objects
            .iter()
            .flat_map(|(object_id, instances)| {
                if instances.is_empty() {
                    vec![LinkObject::new(Lwm2mPath::object(*object_id).to_string())]
                } else {
                    instances
                        .keys()
                        .map(|i| LinkObject::new(Lwm2mPath::instance(*object_id, *i).to_string()))
                        .collect()
                }
            })
            .collect()
    }
}

impl fmt::Debug for ObjectTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectTree")
            .field("objects", &self.objects)
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::StoredResource;
    use crate::node::Value;

    fn device_tree() -> ObjectTree {
        let mut tree = ObjectTree::new();
        tree.add_instance(
            3,
            0,
            [
                (0, StoredResource::read_only("Acme Corp").boxed()),
                (9, StoredResource::read_only(87i64).boxed()),
            ],
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_instance_link_format() {
        let tree = device_tree();
        let document = tree.as_link_format(3, 0).unwrap();

        assert_eq!(document, "</3/0>,</3/0/0>,</3/0/9>");
        assert!(!document.ends_with(','));
        assert_eq!(link::parse(document.as_bytes()).unwrap().len(), 3);
    }

    #[test]
    fn test_link_format_with_attributes() {
        let mut tree = device_tree();
        tree.set_attributes(Lwm2mPath::resource(3, 0, 9), &AttributeSet::new().with_pmin(10))
            .unwrap();

        assert_eq!(
            tree.as_link_format(3, 0).unwrap(),
            "</3/0>,</3/0/0>,</3/0/9>;pmin=10"
        );
        assert!(tree
            .set_attributes(Lwm2mPath::resource(3, 0, 1), &AttributeSet::new().with_pmin(1))
            .is_err());
    }

    #[test]
    fn test_attributes_checked_after_merge() {
        let mut tree = device_tree();
        let path = Lwm2mPath::resource(3, 0, 9);
        tree.set_attributes(path, &AttributeSet::new().with_pmin(10)).unwrap();

        let err = tree
            .set_attributes(path, &AttributeSet::new().with_pmax(5))
            .unwrap_err();
        assert!(matches!(err, Lwm2mError::InvalidValue { .. }));
        assert_eq!(tree.attributes(&path), Some(&AttributeSet::new().with_pmin(10)));

        tree.set_attributes(path, &AttributeSet::new().with_pmax(60)).unwrap();
        assert_eq!(
            tree.as_link_format(3, 0).unwrap(),
            "</3/0>,</3/0/0>,</3/0/9>;pmin=10;pmax=60"
        );
    }

    #[test]
    fn test_object_links() {
        let mut tree = device_tree();
        tree.add_instance(3, 1, []).unwrap();

        let urls: Vec<String> = tree
            .object_links(3)
            .unwrap()
            .into_iter()
            .map(|l| l.url)
            .collect();
        assert_eq!(urls, ["/3", "/3/0", "/3/0/0", "/3/0/9", "/3/1"]);
    }

    #[test]
    fn test_detach() {
        let mut tree = device_tree();
        let key = tree.instance_key(3, 0).unwrap();
        assert_eq!(tree.instance_path(key), Some(Lwm2mPath::instance(3, 0)));

        tree.detach(key).unwrap();
        assert!(tree.instance_ids(3).is_empty());
        assert_eq!(tree.object_links(3).unwrap().len(), 1);
        assert!(tree.instance_links(3, 0).is_err());

        // already detached
        assert!(matches!(tree.detach(key), Err(Lwm2mError::NotFound(_))));
        assert!(tree.delete_instance(3, 0).is_err());
    }

    #[test]
    fn test_slot_reuse() {
        let mut tree = device_tree();
        let key = tree.instance_key(3, 0).unwrap();
        tree.delete_instance(3, 0).unwrap();

        let reused = tree.add_instance(2, 5, []).unwrap();
        assert_eq!(reused, key);
        assert_eq!(tree.instance_path(reused), Some(Lwm2mPath::instance(2, 5)));
        assert_eq!(tree.next_instance_id(2), Some(0));
        assert_eq!(tree.next_instance_id(7), Some(0));
    }

    #[test]
    fn test_duplicate_instance() {
        let mut tree = device_tree();
        assert!(tree.add_instance(3, 0, []).is_err());
    }

    #[test]
    fn test_resource_lookup() {
        let mut tree = device_tree();
        let path = Lwm2mPath::resource(3, 0, 9);
        assert!(tree.contains(&path));
        assert!(!tree.contains(&Lwm2mPath::resource(3, 0, 1)));

        let value = tree.resource(&path).unwrap().read().unwrap();
        assert_eq!(value, crate::node::ResourceValue::Single(Value::Integer(87)));
        assert!(tree.resource_mut(&path).is_some());
        assert_eq!(
            tree.registration_links(),
            vec![LinkObject::new("/3/0")]
        );
    }
}
