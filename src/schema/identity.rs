//! Entity identity and navigation slots.
//!
//! `EntityId` is the domain-level identifier every node and relationship
//! carries. `Endpoint` and `Navigation` are the depth-gated slots filled by
//! the hydrator; they point into an [`ObjectGraph`](crate::ObjectGraph).

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hydrate::{ObjectGraph, ObjectKey};
use super::{NodeType, RelationshipType};

// ============================================================================
// EntityId
// ============================================================================

/// Domain identifier of a node or relationship.
///
/// Immutable once persisted: there is no mutation API, updates are keyed by
/// it, and creating a second entity with the same id is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self { Self(s) }
}

// ============================================================================
// Endpoint
// ============================================================================

/// In-memory node attached to an endpoint before it is persisted.
#[derive(Clone)]
pub struct StagedNode {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) describe: fn() -> super::TypeDescriptor,
    pub(crate) value: Arc<dyn Any + Send + Sync>,
}

impl StagedNode {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<N: NodeType>(&self) -> Option<&N> {
        self.value.downcast_ref::<N>()
    }
}

impl fmt::Debug for StagedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedNode").field("type", &self.type_name).finish()
    }
}

/// What an endpoint currently holds besides its id.
#[derive(Debug, Clone)]
pub enum EndpointNode {
    /// Materialized by a read, lives in the read's object graph.
    Loaded(ObjectKey),
    /// Supplied by the caller for cascade writes.
    Staged(StagedNode),
}

/// Source or target end of a relationship.
///
/// Setting the node updates the id. Setting a different id drops the
/// cached node, which would otherwise be stale.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EntityId,
    node: Option<EndpointNode>,
}

impl Endpoint {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self { id: id.into(), node: None }
    }

    /// Endpoint carrying an in-memory node.
    pub fn to<N: NodeType>(node: N) -> Self {
        let mut endpoint = Self::new(node.id().clone());
        endpoint.set_node(node);
        endpoint
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<EntityId>) {
        let id = id.into();
        if id != self.id {
            self.node = None;
        }
        self.id = id;
    }

    pub fn set_node<N: NodeType>(&mut self, node: N) {
        self.id = node.id().clone();
        self.node = Some(EndpointNode::Staged(StagedNode {
            type_id: TypeId::of::<N>(),
            type_name: std::any::type_name::<N>(),
            describe: N::descriptor,
            value: Arc::new(node),
        }));
    }

    pub fn node(&self) -> Option<&EndpointNode> {
        self.node.as_ref()
    }

    /// Key of the materialized node, if this endpoint was hydrated.
    pub fn loaded(&self) -> Option<ObjectKey> {
        match &self.node {
            Some(EndpointNode::Loaded(key)) => Some(*key),
            _ => None,
        }
    }

    pub fn staged(&self) -> Option<&StagedNode> {
        match &self.node {
            Some(EndpointNode::Staged(staged)) => Some(staged),
            _ => None,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.loaded().is_some()
    }

    /// Resolve the hydrated node in `graph`.
    pub fn resolve<'g, N: NodeType>(&self, graph: &'g ObjectGraph) -> Option<&'g N> {
        self.loaded().and_then(|key| graph.get::<N>(key))
    }

    pub(crate) fn set_loaded(&mut self, key: ObjectKey) {
        self.node = Some(EndpointNode::Loaded(key));
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Relationship-typed navigation property on a node.
///
/// Empty and unloaded unless the read's traversal depth reached it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    keys: Vec<ObjectKey>,
    loaded: bool,
}

impl Navigation {
    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate the hydrated relationships of type `R`.
    pub fn iter<'g, R: RelationshipType>(&'g self, graph: &'g ObjectGraph) -> impl Iterator<Item = &'g R> + 'g {
        self.keys.iter().filter_map(move |key| graph.get::<R>(*key))
    }

    pub(crate) fn fill(&mut self, keys: Vec<ObjectKey>) {
        self.keys = keys;
        self.loaded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_setting_id_invalidates_loaded_node() {
        let mut endpoint = Endpoint::new("a");
        endpoint.set_loaded(ObjectKey::from_index(3));
        endpoint.set_id("a");
        assert!(endpoint.is_hydrated());

        endpoint.set_id("b");
        assert!(!endpoint.is_hydrated());
        assert_eq!(endpoint.id().as_str(), "b");
    }
}
