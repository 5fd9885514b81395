//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Transactions
//!
//! Writes are applied immediately and recorded in the transaction's undo
//! log. `commit_tx()` discards the log; `rollback_tx()` (and dropping an
//! active handle) replays it in reverse. There is no isolation: a
//! concurrent transaction sees uncommitted writes. Use one writer at a time.
//!
//! ## Constraints
//!
//! `Unique` and `Exists` constraints are enforced on every node write.
//! Property lookups always scan; `create_index()` only records the index.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use async_trait::async_trait;
use tracing::trace;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::index::IndexType;
use crate::{Error, Result};
use super::{ConstraintType, StorageBackend};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// label → node IDs (poor man's label index)
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    indexes: RwLock<HashMap<(String, String), IndexType>>,
    constraints: RwLock<HashSet<(String, String, ConstraintType)>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl Default for MemoryInner {
    fn default() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            relationships: RwLock::new(HashMap::new()),
            adjacency: RwLock::new(HashMap::new()),
            label_index: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            constraints: RwLock::new(HashSet::new()),
            next_node_id: AtomicU64::new(1),
            next_rel_id: AtomicU64::new(1),
            next_tx_id: AtomicU64::new(1),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered indexes as `(label, property, type)`.
    pub fn indexes(&self) -> Vec<(String, String, IndexType)> {
        let mut out: Vec<_> = self
            .inner
            .indexes
            .read()
            .iter()
            .map(|((l, p), t)| (l.clone(), p.clone(), *t))
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// One reversible write.
#[derive(Debug)]
enum Undo {
    CreatedNode(NodeId),
    DeletedNode(Node),
    NodeProperties { id: NodeId, old: PropertyMap },
    CreatedRel(RelId),
    DeletedRel(Relationship),
    RelProperties { id: RelId, old: PropertyMap },
}

/// In-memory transaction: an id, a mode and an undo log.
#[derive(Debug)]
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    undo: Vec<Undo>,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut Vec<Undo>> {
        match self.mode {
            TxMode::ReadWrite => Ok(&mut self.undo),
            TxMode::ReadOnly => Err(Error::Transaction(format!("{} is read-only", self.id))),
        }
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// Raw mutations shared by writes and undo
// ============================================================================

impl MemoryInner {
    fn insert_node(&self, node: Node) {
        let id = node.id;
        {
            let mut idx = self.label_index.write();
            for label in &node.labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }
        self.nodes.write().insert(id, node);
        self.adjacency.write().entry(id).or_default();
    }

    fn remove_node(&self, id: NodeId) -> Option<Node> {
        let removed = self.nodes.write().remove(&id);
        self.adjacency.write().remove(&id);
        if let Some(node) = &removed {
            let mut idx = self.label_index.write();
            for label in &node.labels {
                if let Some(ids) = idx.get_mut(label) {
                    ids.retain(|nid| *nid != id);
                    if ids.is_empty() {
                        idx.remove(label);
                    }
                }
            }
        }
        removed
    }

    fn insert_relationship(&self, rel: Relationship) {
        let (id, src, dst) = (rel.id, rel.src, rel.dst);
        self.relationships.write().insert(id, rel);
        let mut adj = self.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }
    }

    fn remove_relationship(&self, id: RelId) -> Option<Relationship> {
        let removed = self.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.adjacency.write();
            if let Some(rels) = adj.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = adj.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        removed
    }

    fn undo(&self, log: Vec<Undo>) {
        for op in log.into_iter().rev() {
            match op {
                Undo::CreatedNode(id) => { self.remove_node(id); }
                Undo::DeletedNode(node) => self.insert_node(node),
                Undo::NodeProperties { id, old } => {
                    if let Some(node) = self.nodes.write().get_mut(&id) {
                        node.properties = old;
                    }
                }
                Undo::CreatedRel(id) => { self.remove_relationship(id); }
                Undo::DeletedRel(rel) => self.insert_relationship(rel),
                Undo::RelProperties { id, old } => {
                    if let Some(rel) = self.relationships.write().get_mut(&id) {
                        rel.properties = old;
                    }
                }
            }
        }
    }

    /// Check `Unique`/`Exists` constraints for `node` as it would be stored.
    fn check_constraints(&self, node: &Node) -> Result<()> {
        let constraints = self.constraints.read();
        if constraints.is_empty() {
            return Ok(());
        }
        let nodes = self.nodes.read();
        let idx = self.label_index.read();
        for (label, property, kind) in constraints.iter() {
            if !node.has_label(label) {
                continue;
            }
            match kind {
                ConstraintType::Exists => {
                    if node.get(property).is_none_or(Value::is_null) {
                        return Err(Error::Conflict(format!(
                            "node with label {label} must have property {property}"
                        )));
                    }
                }
                ConstraintType::Unique => {
                    let Some(value) = node.get(property) else { continue };
                    let taken = idx
                        .get(label)
                        .into_iter()
                        .flatten()
                        .filter(|id| **id != node.id)
                        .filter_map(|id| nodes.get(id))
                        .any(|other| other.get(property) == Some(value));
                    if taken {
                        return Err(Error::Conflict(format!(
                            "{label}.{property} = {value} already exists"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, undo: Vec::new() })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        trace!(tx = %tx.id, writes = tx.undo.len(), "memory commit");
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        self.discard_tx(tx);
        Ok(())
    }

    fn discard_tx(&self, tx: MemoryTx) {
        trace!(tx = %tx.id, writes = tx.undo.len(), "memory rollback");
        self.inner.undo(tx.undo);
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        let undo = tx.writable()?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        };
        self.inner.check_constraints(&node)?;
        self.inner.insert_node(node);
        undo.push(Undo::CreatedNode(id));
        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        let undo = tx.writable()?;
        {
            let adj = self.inner.adjacency.read();
            if let Some(rels) = adj.get(&id) {
                if !rels.is_empty() {
                    return Err(Error::Conflict(
                        format!("Cannot delete node {id} with {} relationships. Delete relationships first.", rels.len())
                    ));
                }
            }
        }
        match self.inner.remove_node(id) {
            Some(node) => {
                undo.push(Undo::DeletedNode(node));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_node_properties(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        props: PropertyMap,
    ) -> Result<()> {
        let undo = tx.writable()?;
        let mut candidate = self
            .inner
            .nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        candidate.properties = props;
        self.inner.check_constraints(&candidate)?;

        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let old = std::mem::replace(&mut node.properties, candidate.properties);
        undo.push(Undo::NodeProperties { id, old });
        trace!(node = %id, "node properties replaced");
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let undo = tx.writable()?;
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("Source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("Target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let mut rel = Relationship::new(id, src, dst, rel_type);
        rel.properties = props;
        self.inner.insert_relationship(rel);
        undo.push(Undo::CreatedRel(id));
        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.inner.relationships.read().get(&id).cloned())
    }

    async fn replace_relationship_properties(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        props: PropertyMap,
    ) -> Result<()> {
        let undo = tx.writable()?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        let old = std::mem::replace(&mut rel.properties, props);
        undo.push(Undo::RelProperties { id, old });
        Ok(())
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        let undo = tx.writable()?;
        match self.inner.remove_relationship(id) {
            Some(rel) => {
                undo.push(Undo::DeletedRel(rel));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let rel_ids = adj.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for rid in rel_ids {
            if let Some(rel) = rels.get(&rid) {
                let matches_dir = match dir {
                    Direction::Outgoing => rel.src == node,
                    Direction::Incoming => rel.dst == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.is_none_or(|t| rel.rel_type == t);

                if matches_dir && matches_type {
                    result.push(rel.clone());
                }
            }
        }

        Ok(result)
    }

    // ========================================================================
    // Index (recorded only; lookups always scan)
    // ========================================================================

    async fn create_index(&self, label: &str, property: &str, index_type: IndexType) -> Result<()> {
        self.inner
            .indexes
            .write()
            .insert((label.to_string(), property.to_string()), index_type);
        Ok(())
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.nodes.read().len() as u64)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.relationships.read().len() as u64)
    }

    async fn relationship_types(&self, _tx: &MemoryTx) -> Result<Vec<String>> {
        let rels = self.inner.relationships.read();
        let mut types: Vec<String> = rels.values().map(|r| r.rel_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, _tx: &MemoryTx) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self.inner.nodes.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(
        &self,
        _tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter()
            .filter_map(|id| nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }

    async fn relationships_by_type(&self, _tx: &MemoryTx, rel_type: &str) -> Result<Vec<Relationship>> {
        let mut rels: Vec<Relationship> = self
            .inner
            .relationships
            .read()
            .values()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    async fn create_constraint(
        &self,
        label: &str,
        property: &str,
        constraint_type: ConstraintType,
    ) -> Result<()> {
        self.inner
            .constraints
            .write()
            .insert((label.to_string(), property.to_string(), constraint_type));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
