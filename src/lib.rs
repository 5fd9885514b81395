//! # graph-model: typed object/graph mapping over a property-graph store
//!
//! Converts strongly-typed domain nodes and relationships into labeled
//! entities with classified properties and back, controlling how much of
//! the connected graph each read materializes.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the mapper and storage
//! 2. **Descriptors, not reflection**: each type publishes a `TypeDescriptor` once
//! 3. **Labels drive polymorphism**: unrelated type hierarchies meet at shared labels
//! 4. **Depth is explicit**: navigation properties hydrate only as far as asked
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_model::{EntityId, Graph, GraphType, NodeType, Record, Result, TypeDescriptor};
//!
//! struct Person {
//!     id: EntityId,
//!     name: String,
//! }
//!
//! impl GraphType for Person {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::node::<Self>().label("Person").property::<String>("Name").build()
//!     }
//!     fn to_record(&self) -> Result<Record> {
//!         Record::of(self).with("Name", &self.name)
//!     }
//!     fn from_record(mut record: Record) -> Result<Self> {
//!         Ok(Self { id: record.take("Id")?, name: record.take("Name")? })
//!     }
//! }
//!
//! impl NodeType for Person {
//!     fn id(&self) -> &EntityId { &self.id }
//! }
//!
//! # async fn example() -> graph_model::Result<()> {
//! let graph = Graph::open_memory().await?;
//! let ada = Person { id: EntityId::new(), name: "Ada".into() };
//! graph.create_node(&ada, None, None).await?;
//!
//! let read = graph.get_node::<Person>(&ada.id, None, None).await?;
//! assert_eq!(read.root::<Person>()?.name, "Ada");
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | In-memory graph with undo-log transactions |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod mapping;
pub mod hydrate;
pub mod storage;
pub mod tx;
pub mod index;
pub mod options;
pub mod config;
pub mod query;
pub mod traversal;
mod graph;

use std::sync::Arc;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction, Point, IsoDuration,
};

// ============================================================================
// Re-exports: Schema and mapping
// ============================================================================

pub use schema::{
    Endpoint, EntityId, EntityKind, Field, GraphType, ModelRegistry, Navigation, NodeType,
    PropertyConfig, Record, RelationshipType, TypeConfig, TypeDescriptor, Validation,
};
pub use mapping::{Bytes, GraphProperty, Uri};
pub use hydrate::{Hydrated, ObjectGraph, ObjectKey};

// ============================================================================
// Re-exports: Storage, transactions, options
// ============================================================================

pub use storage::{StorageBackend, MemoryBackend, ConstraintType, ExpandDepth};
pub use tx::{GraphTransaction, Transaction, TxId, TxMode, TxState};
pub use options::{GraphOperationOptions, UNBOUNDED_DEPTH};
pub use config::GraphConfig;
pub use query::{NodeQuery, QueryResults};
pub use traversal::{GraphTraversal, TraversalResult};

// ============================================================================
// Top-level Graph handle
// ============================================================================

/// The primary entry point. A `Graph` wraps a storage backend and the
/// model registry, and exposes typed CRUD, queries and traversals.
///
/// Every operation takes an optional [`GraphTransaction`]. Without one the
/// call runs in its own transaction, committed on success and rolled back
/// before any error is returned.
pub struct Graph<B: StorageBackend> {
    backend: B,
    registry: Arc<ModelRegistry>,
    config: GraphConfig,
}

impl<B: StorageBackend> Graph<B> {
    /// Create a Graph with the given backend and default limits.
    pub fn with_backend(backend: B) -> Self {
        Self::with_config(backend, GraphConfig::default())
    }

    pub fn with_config(backend: B, config: GraphConfig) -> Self {
        let classifier = mapping::TypeClassifier::new(config.max_complex_depth);
        let registry = Arc::new(ModelRegistry::with_classifier(classifier));
        Self { backend, registry, config }
    }

    /// Share an existing registry, e.g. one already configured at startup.
    pub fn with_registry(backend: B, registry: Arc<ModelRegistry>, config: GraphConfig) -> Self {
        Self { backend, registry, config }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Begin an explicit transaction. The caller owns its lifecycle.
    pub async fn transaction(&self, mode: TxMode) -> Result<GraphTransaction<'_, B>> {
        GraphTransaction::begin(&self.backend, mode).await
    }
}

/// In-memory graph for testing and embedding.
impl Graph<storage::MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        let backend = storage::MemoryBackend::new();
        Ok(Self::with_backend(backend))
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures converting between typed objects and stored entities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("Unsupported type for {type_name}.{property}: {reason}")]
    UnsupportedType { type_name: String, property: String, reason: String },

    #[error("Type {0} cannot be constructed")]
    NotConstructible(String),

    #[error("Cyclic reference at {0}")]
    CyclicReference(String),

    #[error("Depth limit {limit} exceeded at {path}")]
    DepthExceeded { limit: usize, path: String },

    #[error("Cannot bind property {property}: {reason}")]
    Binding { property: String, reason: String },

    #[error("Labels {labels:?} match equally specific types {candidates:?}")]
    AmbiguousType { labels: Vec<String>, candidates: Vec<String> },

    #[error("Validation failed for {property}: {reason}")]
    Validation { property: String, reason: String },

    #[error("Type {0} is not registered")]
    Unregistered(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The two families callers distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    /// Lookup, mapping, conflict and backend failures.
    Data,
    /// Misuse or failure of a transaction.
    Transaction,
}

impl Error {
    pub fn family(&self) -> ErrorFamily {
        match self {
            Error::Transaction(_) => ErrorFamily::Transaction,
            _ => ErrorFamily::Data,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
