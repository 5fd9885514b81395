//! # Storage Backend Trait
//!
//! The contract between the mapping engine and a property-graph store.
//! The engine needs only a small primitive set (create/read entities,
//! create/read edges, transactions); everything else has a default built
//! on those primitives.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory, undo-log transactions, for testing/embedding |

pub mod memory;

use async_trait::async_trait;

use crate::index::IndexType;
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// Expand depth
// ============================================================================

/// Hop bounds for graph expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandDepth {
    /// Exact depth
    Exact(usize),
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
}

impl ExpandDepth {
    /// Inclusive `(min, max)` hop bounds.
    pub fn bounds(self) -> (usize, usize) {
        match self {
            ExpandDepth::Exact(d) => (d, d),
            ExpandDepth::Range { min, max } => (min, max),
        }
    }
}

// ============================================================================
// Constraint types
// ============================================================================

/// Type of constraint to create on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    /// Property value must be unique for nodes with this label.
    Unique,
    /// Property must exist on all nodes with this label.
    Exists,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Backends return `Error::Backend` for failures of their own and
/// `Error::NotFound`/`Error::Conflict` where those meanings apply.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Synchronous rollback for a transaction abandoned without commit or
    /// rollback (its handle was dropped). Must not block on I/O.
    fn discard_tx(&self, tx: Self::Tx) {
        drop(tx);
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has relationships.
    async fn delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    /// Replace the whole property map of a node. Constraints are checked
    /// against the new map.
    async fn replace_node_properties(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        props: PropertyMap,
    ) -> Result<()>;

    /// Delete a node and all its relationships in one operation.
    ///
    /// Default: get all relationships, delete each, then delete the node.
    async fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let rels = self.get_relationships(tx, id, Direction::Both, None).await?;
        for rel in &rels {
            self.delete_relationship(tx, rel.id).await?;
        }
        self.delete_node(tx, id).await
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Replace the whole property map of a relationship.
    async fn replace_relationship_properties(
        &self,
        tx: &mut Self::Tx,
        id: RelId,
        props: PropertyMap,
    ) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Expand from a node: BFS traversal to the given depth. Paths never
    /// revisit a node.
    ///
    /// Default: breadth-first over [`get_relationships`](Self::get_relationships).
    async fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>> {
        let (min_depth, max_depth) = depth.bounds();
        let start = self
            .get_node(tx, node)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {node}")))?;

        let mut results = Vec::new();
        if min_depth == 0 {
            results.push(Path::single(start.clone()));
        }
        let mut queue = vec![Path::single(start)];

        for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();
            for path in &queue {
                let Some(tip) = path.end().map(|n| n.id) else { continue };
                for rel in self.get_relationships(tx, tip, dir, None).await? {
                    if !rel_types.is_empty() && !rel_types.contains(&rel.rel_type.as_str()) {
                        continue;
                    }
                    let next_id = rel.other_node(tip).unwrap_or(rel.dst);
                    if path.nodes.iter().any(|n| n.id == next_id) {
                        continue;
                    }
                    if let Some(next_node) = self.get_node(tx, next_id).await? {
                        let mut new_path = path.clone();
                        new_path.append(rel, next_node);
                        if current_depth + 1 >= min_depth {
                            results.push(new_path.clone());
                        }
                        if current_depth + 1 < max_depth {
                            next_queue.push(new_path);
                        }
                    }
                }
            }
            queue = next_queue;
            if queue.is_empty() {
                break;
            }
        }
        Ok(results)
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Create an index on a label+property combination.
    async fn create_index(
        &self,
        label: &str,
        property: &str,
        index_type: IndexType,
    ) -> Result<()>;

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// All distinct relationship types in the graph.
    async fn relationship_types(&self, tx: &Self::Tx) -> Result<Vec<String>>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes (no label filter).
    async fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value (index-backed if available).
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    /// Find all relationships of a given type.
    ///
    /// Default: scans all nodes and collects outgoing relationships of that type.
    async fn relationships_by_type(
        &self,
        tx: &Self::Tx,
        rel_type: &str,
    ) -> Result<Vec<Relationship>> {
        let mut result = Vec::new();
        let nodes = self.all_nodes(tx).await?;
        for node in &nodes {
            let rels = self.get_relationships(
                tx, node.id, Direction::Outgoing, Some(rel_type),
            ).await?;
            result.extend(rels);
        }
        Ok(result)
    }

    /// Find relationships of a given type by property value.
    ///
    /// Default: filters [`relationships_by_type`](Self::relationships_by_type).
    async fn relationships_by_property(
        &self,
        tx: &Self::Tx,
        rel_type: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Relationship>> {
        let rels = self.relationships_by_type(tx, rel_type).await?;
        Ok(rels.into_iter().filter(|r| r.get(key) == Some(value)).collect())
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint.
    ///
    /// Default returns "not supported".
    async fn create_constraint(
        &self,
        _label: &str,
        _property: &str,
        _constraint_type: ConstraintType,
    ) -> Result<()> {
        Err(Error::Backend("constraints not supported".into()))
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// Batch create nodes.
    ///
    /// Default falls back to sequential `create_node` calls.
    async fn create_nodes_batch(
        &self,
        tx: &mut Self::Tx,
        nodes: Vec<(Vec<String>, PropertyMap)>,
    ) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(nodes.len());
        for (labels, props) in nodes {
            let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
            ids.push(self.create_node(tx, &label_refs, props).await?);
        }
        Ok(ids)
    }

    /// Batch create relationships.
    ///
    /// Default falls back to sequential `create_relationship` calls.
    async fn create_relationships_batch(
        &self,
        tx: &mut Self::Tx,
        rels: Vec<(NodeId, NodeId, String, PropertyMap)>,
    ) -> Result<Vec<RelId>> {
        let mut ids = Vec::with_capacity(rels.len());
        for (src, dst, rel_type, props) in rels {
            ids.push(self.create_relationship(tx, src, dst, &rel_type, props).await?);
        }
        Ok(ids)
    }
}
