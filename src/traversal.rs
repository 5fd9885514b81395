//! # Traversals
//!
//! A [`GraphTraversal`] walks from one start node through a sequence of
//! steps. Each step follows one relationship type in one direction for a
//! hop range and keeps the paths whose end node carries the step's target
//! label. The end nodes of the last step are hydrated with the call's
//! options.

use std::collections::HashSet;
use std::marker::PhantomData;

use tracing::debug;

use crate::graph::in_transaction;
use crate::hydrate::{ObjectGraph, ObjectKey};
use crate::model::{Direction, Path};
use crate::options::GraphOperationOptions;
use crate::schema::{EntityId, NodeType, ObjectShape, RelationshipType};
use crate::storage::{ExpandDepth, StorageBackend};
use crate::tx::{GraphTransaction, TxMode};
use crate::{Error, Graph, MappingError, Result};

/// One hop range along a relationship type.
#[derive(Debug, Clone, Copy)]
struct Step {
    relationship: ObjectShape,
    target: ObjectShape,
    direction: Direction,
    min: usize,
    max: usize,
}

/// Builder for a multi-step traversal starting at a node of type `S`.
pub struct GraphTraversal<'g, B: StorageBackend, S: NodeType> {
    graph: &'g Graph<B>,
    start: EntityId,
    steps: Vec<Step>,
    depth_limit: Option<usize>,
    include_paths: bool,
    _start: PhantomData<fn() -> S>,
}

impl<B: StorageBackend> Graph<B> {
    /// Start a traversal at the node `start`.
    pub fn traverse<S: NodeType>(&self, start: &EntityId) -> GraphTraversal<'_, B, S> {
        GraphTraversal {
            graph: self,
            start: start.clone(),
            steps: Vec::new(),
            depth_limit: None,
            include_paths: false,
            _start: PhantomData,
        }
    }
}

impl<'g, B: StorageBackend, S: NodeType> GraphTraversal<'g, B, S> {
    /// Follow `R` in `direction` for `min..=max` hops, ending on nodes
    /// labeled as `T`. A `min` of 0 keeps the step's start nodes.
    pub fn step<R: RelationshipType, T: NodeType>(mut self, direction: Direction, min: i32, max: i32) -> Result<Self> {
        if min < 0 {
            return Err(binding("min_depth", format!("{min} is negative")));
        }
        if max < min {
            return Err(binding("max_depth", format!("{max} is below min depth {min}")));
        }
        self.steps.push(Step {
            relationship: ObjectShape::of::<R>(),
            target: ObjectShape::of::<T>(),
            direction,
            min: min as usize,
            max: max as usize,
        });
        Ok(self)
    }

    /// Follow `R` for exactly one hop in its declared direction.
    pub fn out<R: RelationshipType, T: NodeType>(self) -> Result<Self> {
        let direction = self.graph.registry.descriptor::<R>()?.direction;
        self.step::<R, T>(direction, 1, 1)
    }

    /// Drop paths longer than `limit` hops in total.
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = Some(limit);
        self
    }

    /// Return the storage paths alongside the hydrated end nodes.
    pub fn include_paths(mut self) -> Self {
        self.include_paths = true;
        self
    }

    pub async fn execute(
        &self,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<TraversalResult> {
        let graph = self.graph;
        let options = graph.options(options);
        in_transaction!(graph, tx, TxMode::ReadOnly, |t| self.run(t, options))
    }

    async fn run(&self, tx: &mut GraphTransaction<'_, B>, options: &GraphOperationOptions) -> Result<TraversalResult> {
        let graph = self.graph;
        let backend_tx = tx.active()?;
        let start_descriptor = graph.registry.descriptor::<S>()?;

        options.check_cancelled()?;
        let start = graph
            .find_node(backend_tx, Some(start_descriptor.label.as_str()), &self.start)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", start_descriptor.short_name(), self.start)))?;
        let start = graph
            .backend
            .get_node(backend_tx, start)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", start_descriptor.short_name(), self.start)))?;

        let mut paths = vec![Path::single(start)];
        let mut end_shape = ObjectShape::of::<S>();
        for step in &self.steps {
            let rel_descriptor = graph.registry.describe(&step.relationship)?;
            let target_descriptor = graph.registry.describe(&step.target)?;
            let mut next = Vec::new();
            for path in &paths {
                let Some(from) = path.end() else { continue };
                options.check_cancelled()?;
                let found = graph
                    .backend
                    .expand(
                        backend_tx,
                        from.id,
                        step.direction,
                        &[rel_descriptor.label.as_str()],
                        ExpandDepth::Range { min: step.min, max: step.max },
                    )
                    .await?;
                for sub in found {
                    if !sub.end().is_some_and(|n| n.has_label(&target_descriptor.label)) {
                        continue;
                    }
                    let mut joined = path.clone();
                    for (rel, node) in sub.relationships.into_iter().zip(sub.nodes.into_iter().skip(1)) {
                        joined.append(rel, node);
                    }
                    if self.depth_limit.is_none_or(|limit| joined.len() <= limit) {
                        next.push(joined);
                    }
                }
            }
            paths = next;
            end_shape = step.target;
        }

        let mut seen = HashSet::new();
        let ends: Vec<_> = paths
            .iter()
            .filter_map(|p| p.end())
            .filter(|n| seen.insert(n.id))
            .cloned()
            .collect();
        debug!(steps = self.steps.len(), paths = paths.len(), nodes = ends.len(), "traversal finished");

        let (objects, nodes) = graph
            .hydrator(backend_tx, options)
            .hydrate_many(ends, Some(&end_shape))
            .await?;
        Ok(TraversalResult {
            graph: objects,
            nodes,
            paths: if self.include_paths { paths } else { Vec::new() },
        })
    }
}

fn binding(property: &str, reason: String) -> Error {
    MappingError::Binding { property: property.to_owned(), reason }.into()
}

/// End nodes of a traversal, deduplicated in discovery order.
#[derive(Debug)]
pub struct TraversalResult {
    pub graph: ObjectGraph,
    pub nodes: Vec<ObjectKey>,
    /// Storage paths, when requested.
    pub paths: Vec<Path>,
}

impl TraversalResult {
    /// End nodes materialized as `T`.
    pub fn nodes_as<T: NodeType>(&self) -> impl Iterator<Item = &T> + '_ {
        self.nodes.iter().filter_map(|key| self.graph.get::<T>(*key))
    }
}
