//! # TraversalHydrator
//!
//! Materializes stored entities into typed objects and follows
//! relationship-typed navigation properties as far as the caller's
//! [`GraphOperationOptions`] allow.
//!
//! Hydration is breadth-first over a worklist, not recursive. Each hop
//! expands the navigations of the objects materialized in the previous hop:
//!
//! - depth `0`: no navigation is followed;
//! - depth `1`: the root's relationships and their endpoints are loaded,
//!   the endpoints' own navigations stay empty;
//! - depth `N`: `N` hops;
//! - depth `-1`: until no new node is reached, capped at
//!   `max_traversal_depth` hops.
//!
//! A node or relationship reached twice maps to the same [`ObjectKey`], so
//! cyclic graphs terminate and keep reference identity.
//!
//! Endpoint nodes resolve against the relationship's declared endpoint type
//! and its subtypes. An undeclared endpoint resolves against every
//! registered node type, so a label shared by unrelated types there fails
//! with [`MappingError::AmbiguousType`]. Declare endpoints with
//! `DescriptorBuilder::endpoints` to avoid it.

pub mod object_graph;

pub use object_graph::{Hydrated, ObjectGraph, ObjectKey};

use hashbrown::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::mapping::{
    ComplexRef, Entity, EntityDeserializer, EntityRef, LabelResolver, PropertyClass, SerializedGraph,
    ID_PROPERTY, ORDINAL_PROPERTY, property_edge_label,
};
use crate::model::{Direction, Node, NodeId, RelId, Relationship, Value};
use crate::options::GraphOperationOptions;
use crate::schema::{
    CollectionKind, EntityId, EntityKind, Field, ModelRegistry, ObjectShape, TypeDescriptor,
    SOURCE_ID_FIELD, TARGET_ID_FIELD,
};
use crate::storage::StorageBackend;
use crate::{Error, MappingError, Result};

/// Read the synthetic sub-entities of `node` as described by `descriptor`.
///
/// The result is the serialized form of the stored node: entity 0 carries
/// the node's properties, the rest are its decomposed Complex values in
/// stored order.
pub(crate) async fn load_serialized<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    registry: &ModelRegistry,
    options: &GraphOperationOptions,
    descriptor: &Arc<TypeDescriptor>,
    node: Node,
) -> Result<SerializedGraph> {
    let mut graph = SerializedGraph::default();
    let root = graph.push(entity_from_node(descriptor, &node));
    let mut pending = vec![(root, Arc::clone(descriptor), node.id)];

    while let Some((at, descriptor, node_id)) = pending.pop() {
        for property in descriptor.persisted_properties() {
            let Some(PropertyClass::Complex { object, collection }) = property.class() else {
                continue;
            };
            let child_descriptor = registry.describe(object)?;
            let label = property_edge_label(property.storage_name());

            options.check_cancelled()?;
            let mut edges = backend
                .get_relationships(tx, node_id, Direction::Outgoing, Some(&label))
                .await?;
            edges.sort_by_key(|e| (e.get(ORDINAL_PROPERTY).and_then(Value::as_int), e.id));

            let mut items = Vec::with_capacity(edges.len());
            for edge in edges {
                options.check_cancelled()?;
                let child = backend
                    .get_node(tx, edge.dst)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("sub-entity {} of {}", edge.dst, property.name)))?;
                let child_ref = graph.push(entity_from_node(&child_descriptor, &child));
                pending.push((child_ref, Arc::clone(&child_descriptor), child.id));
                items.push(child_ref);
            }

            let slot = match collection {
                None => items.first().copied().map(ComplexRef::One),
                Some(kind) => Some(ComplexRef::Many { ordered: *kind == CollectionKind::Ordered, items }),
            };
            if let Some(slot) = slot {
                graph.entities[at.0]
                    .complex_properties
                    .insert(property.storage_name().to_owned(), slot);
            }
        }
    }
    Ok(graph)
}

fn entity_from_node(descriptor: &TypeDescriptor, node: &Node) -> Entity {
    let mut entity = Entity::new(descriptor.type_name, descriptor.kind, node.labels.to_vec());
    entity.simple_properties = node.properties.clone();
    entity
}

/// Where a hop starts: a materialized node and its resolved type.
struct FrontierNode {
    key: ObjectKey,
    node: NodeId,
    descriptor: Arc<TypeDescriptor>,
}

/// One read's hydration state.
pub(crate) struct Hydrator<'a, B: StorageBackend> {
    backend: &'a B,
    tx: &'a B::Tx,
    registry: &'a ModelRegistry,
    options: &'a GraphOperationOptions,
    max_traversal_depth: usize,
    objects: ObjectGraph,
    node_keys: HashMap<NodeId, ObjectKey>,
    rel_keys: HashMap<RelId, ObjectKey>,
    entity_ids: HashMap<NodeId, EntityId>,
}

impl<'a, B: StorageBackend> Hydrator<'a, B> {
    pub(crate) fn new(
        backend: &'a B,
        tx: &'a B::Tx,
        registry: &'a ModelRegistry,
        options: &'a GraphOperationOptions,
        max_traversal_depth: usize,
    ) -> Self {
        Self {
            backend,
            tx,
            registry,
            options,
            max_traversal_depth,
            objects: ObjectGraph::new(),
            node_keys: HashMap::new(),
            rel_keys: HashMap::new(),
            entity_ids: HashMap::new(),
        }
    }

    /// Materialize `node` as `requested` (or a subtype) and hydrate from it.
    pub(crate) async fn hydrate_node(mut self, node: Node, requested: Option<&ObjectShape>) -> Result<Hydrated> {
        let hops = self.options.depth_limit()?;
        let root = self.add_node(node, requested).await?;
        let key = root.key;
        self.traverse(vec![root], hops).await?;
        Ok(Hydrated::new(self.objects, key))
    }

    /// Materialize `rel` and hydrate from its endpoints. The first hop is
    /// the relationship's own endpoints.
    pub(crate) async fn hydrate_relationship(
        mut self,
        rel: Relationship,
        requested: Option<&ObjectShape>,
    ) -> Result<Hydrated> {
        let hops = self.options.depth_limit()?;
        let (key, descriptor) = self.add_relationship(&rel, requested).await?;
        if hops != Some(0) {
            let frontier = self.link_endpoints(key, &rel, &descriptor).await?;
            self.traverse(frontier, hops.map(|h| h - 1)).await?;
        }
        Ok(Hydrated::new(self.objects, key))
    }

    /// Hydrate a set of already-fetched nodes into one shared graph.
    pub(crate) async fn hydrate_many(
        mut self,
        nodes: Vec<Node>,
        requested: Option<&ObjectShape>,
    ) -> Result<(ObjectGraph, Vec<ObjectKey>)> {
        let hops = self.options.depth_limit()?;
        let mut roots = Vec::with_capacity(nodes.len());
        let mut frontier = Vec::new();
        for node in nodes {
            if let Some(key) = self.node_keys.get(&node.id) {
                roots.push(*key);
                continue;
            }
            let root = self.add_node(node, requested).await?;
            roots.push(root.key);
            frontier.push(root);
        }
        self.traverse(frontier, hops).await?;
        Ok((self.objects, roots))
    }

    async fn traverse(&mut self, mut frontier: Vec<FrontierNode>, hops: Option<usize>) -> Result<()> {
        let limit = hops.unwrap_or(self.max_traversal_depth);
        let mut hop = 0;
        while hop < limit && !frontier.is_empty() {
            let mut next = Vec::new();
            for from in &frontier {
                next.extend(self.expand(from).await?);
            }
            hop += 1;
            trace!(hop, reached = next.len(), "hydration hop");
            frontier = next;
        }
        if hops.is_none() && !frontier.is_empty() {
            return Err(MappingError::DepthExceeded {
                limit: self.max_traversal_depth,
                path: "unbounded traversal".to_owned(),
            }
            .into());
        }
        debug!(objects = self.objects.len(), hops = hop, "hydration finished");
        Ok(())
    }

    /// Follow every navigation of `from`; returns newly reached nodes.
    async fn expand(&mut self, from: &FrontierNode) -> Result<Vec<FrontierNode>> {
        let mut reached = Vec::new();
        for navigation in &from.descriptor.navigations {
            let rel_descriptor = self.registry.describe(&navigation.relationship)?;
            if !self.options.follows(&rel_descriptor.label) {
                continue;
            }
            let direction = navigation.direction.unwrap_or(rel_descriptor.direction);

            self.options.check_cancelled()?;
            let rels = self
                .backend
                .get_relationships(self.tx, from.node, direction, Some(&rel_descriptor.label))
                .await?;

            let mut keys = Vec::with_capacity(rels.len());
            for rel in rels {
                let key = match self.rel_keys.get(&rel.id) {
                    Some(key) => *key,
                    None => {
                        let (key, descriptor) = self.add_relationship(&rel, Some(&navigation.relationship)).await?;
                        reached.extend(self.link_endpoints(key, &rel, &descriptor).await?);
                        key
                    }
                };
                keys.push(key);
            }

            let (descriptor, object) = self
                .objects
                .slot_mut(from.key)
                .ok_or_else(|| Error::NotFound(format!("object {}", from.key.index())))?;
            match descriptor.navigation_mut(object, &navigation.name) {
                Some(slot) => slot.fill(keys),
                None => {
                    return Err(MappingError::Binding {
                        property: navigation.name.clone(),
                        reason: format!("{} exposes no navigation slot", descriptor.type_name),
                    }
                    .into());
                }
            }
        }
        Ok(reached)
    }

    /// Materialize both endpoints of `rel` (reusing known ones) and point
    /// the relationship object at them.
    async fn link_endpoints(
        &mut self,
        rel_key: ObjectKey,
        rel: &Relationship,
        descriptor: &TypeDescriptor,
    ) -> Result<Vec<FrontierNode>> {
        let mut reached = Vec::new();
        let mut ends = [None, None];
        for (slot, (node_id, shape)) in [(rel.src, descriptor.source), (rel.dst, descriptor.target)]
            .into_iter()
            .enumerate()
        {
            let key = match self.node_keys.get(&node_id) {
                Some(key) => {
                    trace!(node = %node_id, "reusing materialized node");
                    *key
                }
                None => {
                    self.options.check_cancelled()?;
                    let node = self
                        .backend
                        .get_node(self.tx, node_id)
                        .await?
                        .ok_or_else(|| Error::NotFound(format!("endpoint node {node_id}")))?;
                    let added = self.add_node(node, shape.as_ref()).await?;
                    let key = added.key;
                    reached.push(added);
                    key
                }
            };
            ends[slot] = Some(key);
        }

        let (rel_descriptor, object) = self
            .objects
            .slot_mut(rel_key)
            .ok_or_else(|| Error::NotFound(format!("object {}", rel_key.index())))?;
        if let (Some((source, target)), [Some(s), Some(t)]) = (rel_descriptor.endpoints_mut(object), ends) {
            source.set_loaded(s);
            target.set_loaded(t);
        }
        Ok(reached)
    }

    async fn add_node(&mut self, node: Node, requested: Option<&ObjectShape>) -> Result<FrontierNode> {
        let resolver = LabelResolver::new(self.registry);
        let descriptor = match requested {
            Some(shape) => resolver.resolve(&node.labels, shape)?,
            None => resolver.resolve_any(&node.labels, EntityKind::Node)?,
        };
        let node_id = node.id;
        let entity_id = node
            .get(ID_PROPERTY)
            .and_then(Value::as_str)
            .map(EntityId::from)
            .ok_or_else(|| Error::NotFound(format!("entity id on node {node_id}")))?;

        let serialized = load_serialized(self.backend, self.tx, self.registry, self.options, &descriptor, node).await?;
        let deserializer = EntityDeserializer::new(self.registry);
        let record = deserializer.record(&descriptor, &serialized, EntityRef(0))?;
        let object = deserializer.construct(&descriptor, record)?;

        let key = self.objects.insert(Arc::clone(&descriptor), object, Some(entity_id.clone()));
        self.node_keys.insert(node_id, key);
        self.entity_ids.insert(node_id, entity_id);
        trace!(node = %node_id, type_name = descriptor.type_name, "materialized node");
        Ok(FrontierNode { key, node: node_id, descriptor })
    }

    async fn add_relationship(
        &mut self,
        rel: &Relationship,
        requested: Option<&ObjectShape>,
    ) -> Result<(ObjectKey, Arc<TypeDescriptor>)> {
        let resolver = LabelResolver::new(self.registry);
        let labels = [rel.rel_type.clone()];
        let descriptor = match requested {
            Some(shape) => resolver.resolve(&labels, shape)?,
            None => resolver.resolve_any(&labels, EntityKind::Relationship)?,
        };

        let mut serialized = SerializedGraph::default();
        let mut entity = Entity::new(descriptor.type_name, descriptor.kind, labels.to_vec());
        entity.simple_properties = rel.properties.clone();
        serialized.push(entity);

        let deserializer = EntityDeserializer::new(self.registry);
        let mut record = deserializer.record(&descriptor, &serialized, EntityRef(0))?;
        let source = self.entity_id_of(rel.src).await?;
        let target = self.entity_id_of(rel.dst).await?;
        record.insert(SOURCE_ID_FIELD, Field::Value(Value::String(source.as_str().to_owned())));
        record.insert(TARGET_ID_FIELD, Field::Value(Value::String(target.as_str().to_owned())));
        let object = deserializer.construct(&descriptor, record)?;

        let entity_id = rel.get(ID_PROPERTY).and_then(Value::as_str).map(EntityId::from);
        let key = self.objects.insert(Arc::clone(&descriptor), object, entity_id);
        self.rel_keys.insert(rel.id, key);
        trace!(rel = %rel.id, type_name = descriptor.type_name, "materialized relationship");
        Ok((key, descriptor))
    }

    async fn entity_id_of(&mut self, node: NodeId) -> Result<EntityId> {
        if let Some(id) = self.entity_ids.get(&node) {
            return Ok(id.clone());
        }
        self.options.check_cancelled()?;
        let stored = self
            .backend
            .get_node(self.tx, node)
            .await?
            .ok_or_else(|| Error::NotFound(format!("endpoint node {node}")))?;
        let id = stored
            .get(ID_PROPERTY)
            .and_then(Value::as_str)
            .map(EntityId::from)
            .ok_or_else(|| Error::NotFound(format!("entity id on node {node}")))?;
        self.entity_ids.insert(node, id.clone());
        Ok(id)
    }
}
