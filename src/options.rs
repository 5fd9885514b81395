//! Per-call options: how far to hydrate and how to cascade writes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Traversal depth meaning "follow until the reachable subgraph is
/// exhausted".
pub const UNBOUNDED_DEPTH: i32 = -1;

/// Immutable per-call control surface.
///
/// `traversal_depth`: `0` follows no navigation property, `1..N` follows
/// that many hops, [`UNBOUNDED_DEPTH`] follows everything reachable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOperationOptions {
    pub traversal_depth: i32,
    pub create_missing_nodes: bool,
    pub update_existing_nodes: bool,
    /// Relationship types to follow; `None` follows all.
    pub relationship_types: Option<BTreeSet<String>>,
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl PartialEq for GraphOperationOptions {
    fn eq(&self, other: &Self) -> bool {
        self.traversal_depth == other.traversal_depth
            && self.create_missing_nodes == other.create_missing_nodes
            && self.update_existing_nodes == other.update_existing_nodes
            && self.relationship_types == other.relationship_types
    }
}

impl GraphOperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.traversal_depth = depth;
        self
    }

    pub fn unbounded(self) -> Self {
        self.with_depth(UNBOUNDED_DEPTH)
    }

    pub fn with_relationship_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn create_missing_nodes(mut self, yes: bool) -> Self {
        self.create_missing_nodes = yes;
        self
    }

    pub fn update_existing_nodes(mut self, yes: bool) -> Self {
        self.update_existing_nodes = yes;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Hop limit, `None` when unbounded. Depths below -1 are rejected.
    pub fn depth_limit(&self) -> Result<Option<usize>> {
        match self.traversal_depth {
            UNBOUNDED_DEPTH => Ok(None),
            d if d >= 0 => Ok(Some(d as usize)),
            d => Err(Error::Mapping(crate::MappingError::Binding {
                property: "traversal_depth".into(),
                reason: format!("{d} is neither -1 nor a hop count"),
            })),
        }
    }

    /// Whether relationships of `rel_type` are followed.
    pub fn follows(&self, rel_type: &str) -> bool {
        self.relationship_types.as_ref().is_none_or(|types| types.contains(rel_type))
    }

    /// Fail with [`Error::Cancelled`] if the caller's token fired.
    pub fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
