//! Typed CRUD on [`Graph`].
//!
//! Writes serialize the object, then issue backend primitives inside the
//! caller's transaction (or an implicit one). Reads resolve the stored
//! entity and hand it to the [`Hydrator`].

use std::any::Any;
use std::collections::HashSet;

use tracing::{debug, trace};

use crate::hydrate::{Hydrated, Hydrator};
use crate::index::IndexType;
use crate::mapping::{EntitySerializer, ID_PROPERTY, ORDINAL_PROPERTY, SerializedGraph, is_property_edge};
use crate::model::{Direction, NodeId, PropertyMap, Value};
use crate::options::GraphOperationOptions;
use crate::schema::{
    Endpoint, EntityId, EntityKind, NodeType, ObjectShape, RelationshipType, TypeDescriptor,
};
use crate::storage::{ConstraintType, StorageBackend};
use crate::tx::{GraphTransaction, TxMode};
use crate::{Error, Graph, MappingError, Result};

/// Run `$body` in the supplied transaction, or in a fresh one that is
/// committed on success and rolled back on failure.
macro_rules! in_transaction {
    ($graph:expr, $tx:expr, $mode:expr, |$t:ident| $body:expr) => {
        match $tx {
            Some($t) => {
                let result: $crate::Result<_> = $body.await;
                result
            }
            None => {
                let mut owned = $graph.transaction($mode).await?;
                let result: $crate::Result<_> = {
                    let $t = &mut owned;
                    $body.await
                };
                owned.complete(result).await
            }
        }
    };
}

pub(crate) use in_transaction;

fn id_value(id: &EntityId) -> Value {
    Value::String(id.as_str().to_owned())
}

impl<B: StorageBackend> Graph<B> {
    pub(crate) fn options<'a>(&'a self, options: Option<&'a GraphOperationOptions>) -> &'a GraphOperationOptions {
        options.unwrap_or(&self.config.default_options)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Persist a new node with its Complex properties. A node with the same
    /// id already stored under the type's label is a conflict.
    pub async fn create_node<N: NodeType>(
        &self,
        node: &N,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<N>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            self.insert_node(backend_tx, &descriptor, node, options).await.map(|_| ())
        })
    }

    /// Read the node `id` as `N` (or the most specific registered subtype
    /// its labels name), hydrated to the requested depth.
    pub async fn get_node<N: NodeType>(
        &self,
        id: &EntityId,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<Hydrated> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<N>()?;
        in_transaction!(self, tx, TxMode::ReadOnly, |t| async {
            let backend_tx = t.active()?;
            options.check_cancelled()?;
            let node_id = self
                .find_node(backend_tx, Some(descriptor.label.as_str()), id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", descriptor.short_name())))?;
            let node = self
                .backend
                .get_node(backend_tx, node_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", descriptor.short_name())))?;
            self.hydrator(backend_tx, options)
                .hydrate_node(node, Some(&ObjectShape::of::<N>()))
                .await
        })
    }

    /// Replace the stored properties of `node`; its synthetic sub-entities
    /// are recreated from the current values.
    pub async fn update_node<N: NodeType>(
        &self,
        node: &N,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<N>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            let node_id = self
                .find_node(backend_tx, Some(descriptor.label.as_str()), node.id())
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {}", descriptor.short_name(), node.id())))?;
            self.overwrite_node(backend_tx, node_id, &descriptor, node, options).await
        })
    }

    /// Delete the node `id`, its synthetic sub-entities and every
    /// relationship touching it.
    pub async fn delete_node<N: NodeType>(
        &self,
        id: &EntityId,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<N>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            let node_id = self
                .find_node(backend_tx, Some(descriptor.label.as_str()), id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", descriptor.short_name())))?;
            options.check_cancelled()?;
            self.delete_synthetic(backend_tx, node_id).await?;
            self.backend.detach_delete_node(backend_tx, node_id).await?;
            debug!(node = %node_id, id = %id, "deleted node");
            Ok(())
        })
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Persist a relationship between two stored (or cascaded) nodes.
    ///
    /// An endpoint missing from the store is created from the endpoint's
    /// in-memory node when `create_missing_nodes` is set, otherwise the call
    /// fails with `NotFound`. An endpoint already stored is overwritten from
    /// its in-memory node when `update_existing_nodes` is set.
    pub async fn create_relationship<R: RelationshipType>(
        &self,
        rel: &R,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<R>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            let props = self.relationship_properties(&descriptor, rel)?;
            let id = rel.id();
            if self.find_relationship(backend_tx, &descriptor.label, id).await?.is_some() {
                return Err(Error::Conflict(format!("{} {id} already exists", descriptor.short_name())));
            }
            let src = self.resolve_endpoint(backend_tx, rel.source(), descriptor.source, options).await?;
            let dst = self.resolve_endpoint(backend_tx, rel.target(), descriptor.target, options).await?;
            options.check_cancelled()?;
            let rel_id = self.backend.create_relationship(backend_tx, src, dst, &descriptor.label, props).await?;
            debug!(rel = %rel_id, id = %id, rel_type = %descriptor.label, "created relationship");
            Ok(())
        })
    }

    /// Read the relationship `id` as `R`. Depth 1 and above load its
    /// endpoints; deeper reads continue from them.
    pub async fn get_relationship<R: RelationshipType>(
        &self,
        id: &EntityId,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<Hydrated> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<R>()?;
        in_transaction!(self, tx, TxMode::ReadOnly, |t| async {
            let backend_tx = t.active()?;
            options.check_cancelled()?;
            let rel = self
                .find_relationship(backend_tx, &descriptor.label, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", descriptor.short_name())))?;
            self.hydrator(backend_tx, options)
                .hydrate_relationship(rel, Some(&ObjectShape::of::<R>()))
                .await
        })
    }

    /// Replace the stored properties of `rel`. Changed endpoints move the
    /// relationship.
    pub async fn update_relationship<R: RelationshipType>(
        &self,
        rel: &R,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<R>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            let props = self.relationship_properties(&descriptor, rel)?;
            let stored = self
                .find_relationship(backend_tx, &descriptor.label, rel.id())
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {}", descriptor.short_name(), rel.id())))?;
            let src = self.resolve_endpoint(backend_tx, rel.source(), descriptor.source, options).await?;
            let dst = self.resolve_endpoint(backend_tx, rel.target(), descriptor.target, options).await?;
            options.check_cancelled()?;
            if (src, dst) == (stored.src, stored.dst) {
                self.backend.replace_relationship_properties(backend_tx, stored.id, props).await?;
            } else {
                self.backend.delete_relationship(backend_tx, stored.id).await?;
                let moved = self.backend.create_relationship(backend_tx, src, dst, &descriptor.label, props).await?;
                debug!(from = %stored.id, to = %moved, "moved relationship to new endpoints");
            }
            Ok(())
        })
    }

    pub async fn delete_relationship<R: RelationshipType>(
        &self,
        id: &EntityId,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<()> {
        let options = self.options(options);
        let descriptor = self.registry.descriptor::<R>()?;
        in_transaction!(self, tx, TxMode::ReadWrite, |t| async {
            let backend_tx = t.writable()?;
            let stored = self
                .find_relationship(backend_tx, &descriptor.label, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", descriptor.short_name())))?;
            options.check_cancelled()?;
            self.backend.delete_relationship(backend_tx, stored.id).await?;
            Ok(())
        })
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Create backend indexes and constraints for every registered type:
    /// a unique `Id` per node label, plus configured indexed and unique
    /// properties.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut created = 0usize;
        for descriptor in self.registry.types_of_kind(EntityKind::Node) {
            self.backend.create_constraint(&descriptor.label, ID_PROPERTY, ConstraintType::Unique).await?;
            created += 1;
            let simple = descriptor.persisted_properties().filter(|p| p.class().is_some_and(|c| c.is_simple()));
            for property in simple {
                if property.config.indexed {
                    let index = IndexType::for_property(property.config.unique);
                    self.backend.create_index(&descriptor.label, property.storage_name(), index).await?;
                    created += 1;
                }
                if property.config.unique {
                    self.backend
                        .create_constraint(&descriptor.label, property.storage_name(), ConstraintType::Unique)
                        .await?;
                    created += 1;
                }
                if property.config.required {
                    self.backend
                        .create_constraint(&descriptor.label, property.storage_name(), ConstraintType::Exists)
                        .await?;
                    created += 1;
                }
            }
        }
        for descriptor in self.registry.types_of_kind(EntityKind::Relationship) {
            for property in descriptor.persisted_properties().filter(|p| p.config.indexed) {
                let index = IndexType::for_property(property.config.unique);
                self.backend.create_index(&descriptor.label, property.storage_name(), index).await?;
                created += 1;
            }
        }
        debug!(created, "schema ensured");
        Ok(())
    }

    // ========================================================================
    // Internals shared with query and traversal
    // ========================================================================

    pub(crate) fn hydrator<'a>(&'a self, tx: &'a B::Tx, options: &'a GraphOperationOptions) -> Hydrator<'a, B> {
        Hydrator::new(&self.backend, tx, &self.registry, options, self.config.max_traversal_depth)
    }

    /// Backend id of the addressable node `id`, scanning `label` when known.
    pub(crate) async fn find_node(&self, tx: &B::Tx, label: Option<&str>, id: &EntityId) -> Result<Option<NodeId>> {
        let value = id_value(id);
        let found = match label {
            Some(label) => self.backend.nodes_by_property(tx, label, ID_PROPERTY, &value).await?,
            None => self
                .backend
                .all_nodes(tx)
                .await?
                .into_iter()
                .filter(|n| n.get(ID_PROPERTY) == Some(&value))
                .collect(),
        };
        Ok(found.first().map(|n| n.id))
    }

    async fn find_relationship(
        &self,
        tx: &B::Tx,
        rel_type: &str,
        id: &EntityId,
    ) -> Result<Option<crate::model::Relationship>> {
        let found = self.backend.relationships_by_property(tx, rel_type, ID_PROPERTY, &id_value(id)).await?;
        Ok(found.into_iter().next())
    }

    // ========================================================================
    // Write helpers
    // ========================================================================

    async fn insert_node(
        &self,
        tx: &mut B::Tx,
        descriptor: &TypeDescriptor,
        object: &dyn Any,
        options: &GraphOperationOptions,
    ) -> Result<NodeId> {
        let serialized = EntitySerializer::new(&self.registry).serialize_erased(descriptor, object)?;
        let id = descriptor
            .entity_id(object)
            .ok_or_else(|| MappingError::Unregistered(descriptor.type_name.to_owned()))?;
        if self.find_node(tx, Some(descriptor.label.as_str()), id).await?.is_some() {
            return Err(Error::Conflict(format!("{} {id} already exists", descriptor.short_name())));
        }
        let node_id = self.write_serialized(tx, None, serialized, options).await?;
        debug!(node = %node_id, id = %id, label = %descriptor.label, "created node");
        Ok(node_id)
    }

    async fn overwrite_node(
        &self,
        tx: &mut B::Tx,
        node_id: NodeId,
        descriptor: &TypeDescriptor,
        object: &dyn Any,
        options: &GraphOperationOptions,
    ) -> Result<()> {
        let mut serialized = EntitySerializer::new(&self.registry).serialize_erased(descriptor, object)?;
        let props = std::mem::take(&mut serialized.entities[0].simple_properties);
        options.check_cancelled()?;
        self.backend.replace_node_properties(tx, node_id, props).await?;
        self.delete_synthetic(tx, node_id).await?;
        self.write_serialized(tx, Some(node_id), serialized, options).await?;
        debug!(node = %node_id, label = %descriptor.label, "updated node");
        Ok(())
    }

    /// Create the entities and property edges of `graph`. With `root` set,
    /// entity 0 is already stored under that id and only its sub-entities
    /// are created.
    async fn write_serialized(
        &self,
        tx: &mut B::Tx,
        root: Option<NodeId>,
        graph: SerializedGraph,
        options: &GraphOperationOptions,
    ) -> Result<NodeId> {
        let skip = usize::from(root.is_some());
        let pending: Vec<(Vec<String>, PropertyMap)> = graph
            .entities
            .into_iter()
            .skip(skip)
            .map(|e| (e.labels, e.simple_properties))
            .collect();

        options.check_cancelled()?;
        let mut ids = Vec::with_capacity(pending.len() + skip);
        ids.extend(root);
        ids.extend(self.backend.create_nodes_batch(tx, pending).await?);

        let edges: Vec<_> = graph
            .edges
            .into_iter()
            .map(|edge| {
                let mut props = PropertyMap::new();
                if let Some(ordinal) = edge.ordinal {
                    props.insert(ORDINAL_PROPERTY.to_owned(), Value::Int(ordinal as i64));
                }
                (ids[edge.parent.0], ids[edge.child.0], edge.label, props)
            })
            .collect();
        if !edges.is_empty() {
            options.check_cancelled()?;
            let count = edges.len();
            self.backend.create_relationships_batch(tx, edges).await?;
            trace!(entities = ids.len(), edges = count, "wrote synthetic sub-entities");
        }
        ids.first()
            .copied()
            .ok_or_else(|| Error::Backend("serialized graph has no root entity".into()))
    }

    /// Delete every synthetic sub-entity hanging off `node`.
    async fn delete_synthetic(&self, tx: &mut B::Tx, node: NodeId) -> Result<()> {
        let mut seen = HashSet::new();
        let mut pending = vec![node];
        let mut doomed = Vec::new();
        while let Some(parent) = pending.pop() {
            for edge in self.backend.get_relationships(tx, parent, Direction::Outgoing, None).await? {
                if is_property_edge(&edge.rel_type) && seen.insert(edge.dst) {
                    pending.push(edge.dst);
                    doomed.push(edge.dst);
                }
            }
        }
        for child in doomed.iter().rev() {
            self.backend.detach_delete_node(tx, *child).await?;
        }
        if !doomed.is_empty() {
            trace!(node = %node, removed = doomed.len(), "deleted synthetic sub-entities");
        }
        Ok(())
    }

    fn relationship_properties<R: RelationshipType>(&self, descriptor: &TypeDescriptor, rel: &R) -> Result<PropertyMap> {
        let mut serialized = EntitySerializer::new(&self.registry).serialize_erased(descriptor, rel)?;
        Ok(std::mem::take(&mut serialized.entities[0].simple_properties))
    }

    /// Backend id for a relationship endpoint, applying the cascade policy.
    async fn resolve_endpoint(
        &self,
        tx: &mut B::Tx,
        endpoint: &Endpoint,
        declared: Option<ObjectShape>,
        options: &GraphOperationOptions,
    ) -> Result<NodeId> {
        let staged = endpoint.staged();
        let shape = staged
            .map(|s| ObjectShape { type_id: s.type_id, type_name: s.type_name, describe: s.describe })
            .or(declared);
        let descriptor = match shape {
            Some(shape) => Some(self.registry.describe(&shape)?),
            None => None,
        };
        let label = descriptor.as_ref().map(|d| d.label.as_str());
        let existing = self.find_node(tx, label, endpoint.id()).await?;

        match (existing, staged, descriptor.as_deref()) {
            (Some(node_id), Some(staged), Some(descriptor)) if options.update_existing_nodes => {
                self.overwrite_node(tx, node_id, descriptor, &*staged.value, options).await?;
                trace!(node = %node_id, id = %endpoint.id(), "updated existing endpoint");
                Ok(node_id)
            }
            (Some(node_id), _, _) => Ok(node_id),
            (None, Some(staged), Some(descriptor)) if options.create_missing_nodes => {
                let node_id = self.insert_node(tx, descriptor, &*staged.value, options).await?;
                trace!(node = %node_id, id = %endpoint.id(), "cascade-created endpoint");
                Ok(node_id)
            }
            (None, _, _) => Err(Error::NotFound(format!("endpoint node {}", endpoint.id()))),
        }
    }
}
