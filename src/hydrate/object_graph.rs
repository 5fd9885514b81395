//! Identity map of the objects materialized by one read.
//!
//! Every node or relationship reached by a read lives in exactly one slot,
//! keyed by its entity id. Navigation slots and endpoints refer to other
//! objects by [`ObjectKey`], so a cycle in the stored graph becomes a cycle
//! of keys and the k-th hop of a cycle is the same object as the 0th.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::schema::{EntityId, EntityKind, TypeDescriptor};
use crate::{MappingError, Result};

/// Handle to an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(usize);

impl ObjectKey {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

struct Slot {
    descriptor: Arc<TypeDescriptor>,
    value: Option<Box<dyn Any + Send + Sync>>,
}

/// Arena of hydrated objects.
#[derive(Default)]
pub struct ObjectGraph {
    slots: Vec<Slot>,
    by_id: HashMap<(EntityKind, EntityId), ObjectKey>,
}

impl fmt::Debug for ObjectGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|s| s.descriptor.type_name))
            .finish()
    }
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get<T: 'static>(&self, key: ObjectKey) -> Option<&T> {
        self.slots.get(key.0)?.value.as_ref()?.downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self, key: ObjectKey) -> Option<&mut T> {
        self.slots.get_mut(key.0)?.value.as_mut()?.downcast_mut::<T>()
    }

    pub fn descriptor(&self, key: ObjectKey) -> Option<&TypeDescriptor> {
        self.slots.get(key.0).map(|s| s.descriptor.as_ref())
    }

    /// Key of the node with entity id `id`, if this read materialized it.
    pub fn node_key(&self, id: &EntityId) -> Option<ObjectKey> {
        self.by_id.get(&(EntityKind::Node, id.clone())).copied()
    }

    /// Key of the relationship with entity id `id`.
    pub fn relationship_key(&self, id: &EntityId) -> Option<ObjectKey> {
        self.by_id.get(&(EntityKind::Relationship, id.clone())).copied()
    }

    /// The node `id` as `T`.
    pub fn node<T: 'static>(&self, id: &EntityId) -> Option<&T> {
        self.node_key(id).and_then(|k| self.get(k))
    }

    pub fn keys(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        (0..self.slots.len()).map(ObjectKey)
    }

    /// Every object of type `T`, in materialization order.
    pub fn iter_of<T: 'static>(&self) -> impl Iterator<Item = (ObjectKey, &T)> + '_ {
        self.keys().filter_map(move |k| self.get::<T>(k).map(|v| (k, v)))
    }

    /// Move the object at `key` out of the graph.
    pub fn take<T: 'static>(&mut self, key: ObjectKey) -> Result<T> {
        let slot = self
            .slots
            .get_mut(key.0)
            .ok_or_else(|| crate::Error::NotFound(format!("object {}", key.0)))?;
        let expected = std::any::type_name::<T>();
        let value = slot.value.take().ok_or_else(|| crate::Error::NotFound(format!("object {} already taken", key.0)))?;
        match value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(other) => {
                let got = slot.descriptor.type_name.to_owned();
                slot.value = Some(other);
                Err(MappingError::TypeMismatch { expected: expected.to_owned(), got }.into())
            }
        }
    }

    pub(crate) fn insert(
        &mut self,
        descriptor: Arc<TypeDescriptor>,
        value: Box<dyn Any + Send + Sync>,
        id: Option<EntityId>,
    ) -> ObjectKey {
        let key = ObjectKey(self.slots.len());
        if let Some(id) = id {
            self.by_id.insert((descriptor.kind, id), key);
        }
        self.slots.push(Slot { descriptor, value: Some(value) });
        key
    }

    pub(crate) fn slot_mut(&mut self, key: ObjectKey) -> Option<(Arc<TypeDescriptor>, &mut (dyn Any + Send + Sync))> {
        let slot = self.slots.get_mut(key.0)?;
        let descriptor = Arc::clone(&slot.descriptor);
        let value = slot.value.as_deref_mut()?;
        Some((descriptor, value))
    }
}

/// Result of a read: the requested root plus everything hydrated with it.
#[derive(Debug)]
pub struct Hydrated {
    graph: ObjectGraph,
    root: ObjectKey,
}

impl Hydrated {
    pub(crate) fn new(graph: ObjectGraph, root: ObjectKey) -> Self {
        Self { graph, root }
    }

    pub fn root<T: 'static>(&self) -> Result<&T> {
        self.graph.get::<T>(self.root).ok_or_else(|| {
            MappingError::TypeMismatch {
                expected: std::any::type_name::<T>().to_owned(),
                got: self.root_descriptor().map(|d| d.type_name).unwrap_or("nothing").to_owned(),
            }
            .into()
        })
    }

    /// Take the root out, discarding the rest of the graph.
    pub fn into_root<T: 'static>(mut self) -> Result<T> {
        self.graph.take(self.root)
    }

    pub fn root_key(&self) -> ObjectKey {
        self.root
    }

    pub fn root_descriptor(&self) -> Option<&TypeDescriptor> {
        self.graph.descriptor(self.root)
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn into_parts(self) -> (ObjectGraph, ObjectKey) {
        (self.graph, self.root)
    }
}
