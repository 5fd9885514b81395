//! # Node queries
//!
//! A [`NodeQuery`] accumulates filters, ordering and paging in memory and
//! executes as one label scan. Stored-property predicates
//! ([`NodeQuery::where_property`]) are checked before materialization;
//! typed predicates ([`NodeQuery::filter`]) run on the hydrated objects.
//! A row materialized as a subtype of `N` is filtered and ordered through
//! an `N` read from the same stored node.
//!
//! ```rust,no_run
//! # use graph_model::{Graph, MemoryBackend, NodeType};
//! # async fn example<P: NodeType>(graph: &Graph<MemoryBackend>, age: impl Fn(&P) -> i64 + Send + Sync + 'static) -> graph_model::Result<()> {
//! let adults = graph
//!     .nodes::<P>()
//!     .filter(move |p| age(p) >= 18)
//!     .take(10)
//!     .to_list(None, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::marker::PhantomData;

use hashbrown::HashMap;
use tracing::debug;

use crate::graph::in_transaction;
use crate::hydrate::{Hydrated, ObjectGraph, ObjectKey, load_serialized};
use crate::mapping::EntityDeserializer;
use crate::model::Value;
use crate::options::GraphOperationOptions;
use crate::schema::{NodeType, ObjectShape};
use crate::storage::StorageBackend;
use crate::tx::{GraphTransaction, TxMode};
use crate::{Error, Graph, Result};

type Predicate<N> = Box<dyn Fn(&N) -> bool + Send + Sync>;
type Comparator<N> = Box<dyn Fn(&N, &N) -> Ordering + Send + Sync>;

/// Lazy query over the nodes of type `N` (and its registered subtypes).
pub struct NodeQuery<'g, B: StorageBackend, N: NodeType> {
    graph: &'g Graph<B>,
    stored: Vec<(String, Value)>,
    filters: Vec<Predicate<N>>,
    order: Vec<Comparator<N>>,
    skip: usize,
    take: Option<usize>,
}

impl<B: StorageBackend> Graph<B> {
    /// Start a query over nodes of type `N`.
    pub fn nodes<N: NodeType>(&self) -> NodeQuery<'_, B, N> {
        NodeQuery {
            graph: self,
            stored: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            skip: 0,
            take: None,
        }
    }
}

impl<'g, B: StorageBackend, N: NodeType> NodeQuery<'g, B, N> {
    /// Keep nodes whose stored property `name` equals `value`.
    pub fn where_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.stored.push((name.into(), value.into()));
        self
    }

    pub fn filter(mut self, predicate: impl Fn(&N) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Replace any ordering with ascending `key`.
    pub fn order_by<K: Ord>(mut self, key: impl Fn(&N) -> K + Send + Sync + 'static) -> Self {
        self.order.clear();
        self.then_by(key)
    }

    /// Replace any ordering with descending `key`.
    pub fn order_by_descending<K: Ord>(mut self, key: impl Fn(&N) -> K + Send + Sync + 'static) -> Self {
        self.order.clear();
        self.then_by_descending(key)
    }

    pub fn then_by<K: Ord>(mut self, key: impl Fn(&N) -> K + Send + Sync + 'static) -> Self {
        self.order.push(Box::new(move |a, b| key(a).cmp(&key(b))));
        self
    }

    pub fn then_by_descending<K: Ord>(mut self, key: impl Fn(&N) -> K + Send + Sync + 'static) -> Self {
        self.order.push(Box::new(move |a, b| key(b).cmp(&key(a))));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// Every matching node, hydrated into one shared object graph.
    pub async fn to_list(
        &self,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<QueryResults<N>> {
        let graph = self.graph;
        let options = graph.options(options);
        in_transaction!(graph, tx, TxMode::ReadOnly, |t| self.run(t, options))
    }

    pub async fn first_or_default(
        &self,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<Option<Hydrated>> {
        Ok(self.to_list(options, tx).await?.into_first())
    }

    /// The only matching node, `None` if there is none. More than one is a
    /// conflict.
    pub async fn single_or_default(
        &self,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<Option<Hydrated>> {
        let results = self.to_list(options, tx).await?;
        if results.len() > 1 {
            return Err(Error::Conflict(format!(
                "expected at most one {}, found {}",
                std::any::type_name::<N>(),
                results.len()
            )));
        }
        Ok(results.into_first())
    }

    pub async fn count(
        &self,
        options: Option<&GraphOperationOptions>,
        tx: Option<&mut GraphTransaction<'_, B>>,
    ) -> Result<usize> {
        Ok(self.to_list(options, tx).await?.len())
    }

    async fn run(&self, tx: &mut GraphTransaction<'_, B>, options: &GraphOperationOptions) -> Result<QueryResults<N>> {
        let graph = self.graph;
        let backend_tx = tx.active()?;
        let descriptor = graph.registry.descriptor::<N>()?;

        options.check_cancelled()?;
        let mut nodes = graph.backend.nodes_by_label(backend_tx, &descriptor.label).await?;
        nodes.retain(|node| self.stored.iter().all(|(name, value)| node.get(name) == Some(value)));
        nodes.sort_by_key(|node| node.id);
        let scanned = nodes.len();

        let (objects, roots) = graph
            .hydrator(backend_tx, options)
            .hydrate_many(nodes.clone(), Some(&ObjectShape::of::<N>()))
            .await?;

        // Subtype rows are judged as an `N` read from the same node.
        let mut views: HashMap<ObjectKey, N> = HashMap::new();
        for (node, key) in nodes.into_iter().zip(&roots) {
            if objects.get::<N>(*key).is_some() || views.contains_key(key) {
                continue;
            }
            let serialized =
                load_serialized(&graph.backend, backend_tx, &graph.registry, options, &descriptor, node).await?;
            views.insert(*key, EntityDeserializer::new(&graph.registry).deserialize::<N>(&serialized)?);
        }
        let row = |key: &ObjectKey| objects.get::<N>(*key).or_else(|| views.get(key));

        let mut rows: Vec<(ObjectKey, &N)> = roots
            .iter()
            .filter_map(|key| row(key).map(|n| (*key, n)))
            .filter(|(_, n)| self.filters.iter().all(|f| f(*n)))
            .collect();
        if !self.order.is_empty() {
            rows.sort_by(|(_, a), (_, b)| {
                self.order
                    .iter()
                    .map(|cmp| cmp(*a, *b))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        let keys: Vec<ObjectKey> = rows
            .into_iter()
            .map(|(key, _)| key)
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .collect();

        debug!(label = %descriptor.label, scanned, returned = keys.len(), "node query");
        Ok(QueryResults { objects, keys, _marker: PhantomData })
    }
}

/// Rows of a [`NodeQuery`], in result order. Navigation properties of the
/// rows point into [`QueryResults::graph`].
///
/// Rows materialized as a subtype of `N` are reachable through
/// [`QueryResults::keys`] but not through [`QueryResults::iter`].
#[derive(Debug)]
pub struct QueryResults<N> {
    objects: ObjectGraph,
    keys: Vec<ObjectKey>,
    _marker: PhantomData<fn() -> N>,
}

impl<N: NodeType> QueryResults<N> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.objects
    }

    pub fn iter(&self) -> impl Iterator<Item = &N> + '_ {
        self.keys.iter().filter_map(|key| self.objects.get::<N>(*key))
    }

    /// Move the rows out, dropping everything else the read hydrated.
    pub fn into_vec(mut self) -> Result<Vec<N>> {
        let keys = std::mem::take(&mut self.keys);
        keys.into_iter().map(|key| self.objects.take::<N>(key)).collect()
    }

    fn into_first(self) -> Option<Hydrated> {
        let root = self.keys.first().copied()?;
        Some(Hydrated::new(self.objects, root))
    }
}
