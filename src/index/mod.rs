//! Index management.
//!
//! Indexes are requested from the backend by [`Graph::ensure_schema`](crate::Graph::ensure_schema)
//! for properties configured as indexed or unique.

use serde::{Deserialize, Serialize};

/// Type of index to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// B-tree index for equality and range queries.
    BTree,
    /// Unique constraint (implies B-tree).
    Unique,
}

impl IndexType {
    /// Index kind for a configured property.
    pub fn for_property(unique: bool) -> Self {
        if unique { IndexType::Unique } else { IndexType::BTree }
    }
}
