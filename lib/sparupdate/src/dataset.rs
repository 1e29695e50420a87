use crate::error::StorageError;
use oxrdf::{Graph, GraphName, NamedNode, Quad, Triple};
use rustc_hash::FxHashMap;
use std::mem::take;

/// The graphs a pattern is evaluated against.
///
/// The `default` graphs are merged to form the default graph of the evaluation and the `named`
/// graphs are the ones `GRAPH` patterns range over. `named: None` means all the named graphs
/// of the dataset.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct GraphSelection {
    pub default: Vec<GraphName>,
    pub named: Option<Vec<GraphName>>,
}

impl GraphSelection {
    #[inline]
    pub fn new(default: Vec<GraphName>, named: Option<Vec<GraphName>>) -> Self {
        Self { default, named }
    }

    /// Uses a single graph as default graph and all named graphs.
    #[inline]
    pub fn graph(graph: GraphName) -> Self {
        Self {
            default: vec![graph],
            named: None,
        }
    }

    /// The dataset given by `USING` and `USING NAMED` clauses.
    pub fn using(default: &[NamedNode], named: &[NamedNode]) -> Self {
        Self {
            default: default.iter().cloned().map(GraphName::NamedNode).collect(),
            named: Some(named.iter().cloned().map(GraphName::NamedNode).collect()),
        }
    }
}

impl Default for GraphSelection {
    #[inline]
    fn default() -> Self {
        Self::graph(GraphName::DefaultGraph)
    }
}

/// A mutable collection of graphs updated by the [`DatasetUpdateProcessor`](crate::DatasetUpdateProcessor).
///
/// Mutations are buffered until [`flush`](Self::flush) and dropped by [`discard`](Self::discard).
/// Both are no-ops if there is no pending change.
pub trait UpdatableDataset {
    fn has_graph(&self, name: &GraphName) -> bool;

    fn graph(&self, name: &GraphName) -> Option<&Graph>;

    /// Returns the graph for modification, `None` if it does not exist.
    fn graph_mut(&mut self, name: &GraphName) -> Option<&mut Graph>;

    /// Adds a graph to the dataset, merging it into the existing one if there is already a graph with this name.
    ///
    /// Returns `true` if the graph did not exist.
    fn add_graph(&mut self, name: GraphName, graph: Graph) -> bool;

    /// Removes a graph, returns `true` if it existed.
    fn remove_graph(&mut self, name: &GraphName) -> bool;

    fn graph_names(&self) -> Vec<GraphName>;

    /// Changes the graphs patterns are evaluated against until the matching [`reset_active_graph`](Self::reset_active_graph) call.
    fn set_active_graph(&mut self, selection: GraphSelection);

    fn reset_active_graph(&mut self);

    fn active_graph(&self) -> GraphSelection;

    fn flush(&mut self) -> Result<(), StorageError>;

    fn discard(&mut self) -> Result<(), StorageError>;
}

/// An in-memory [`UpdatableDataset`].
///
/// Pending changes are kept graph by graph: a graph is copied the first time it is modified
/// in a transaction.
///
/// ```
/// use sparupdate::model::*;
/// use sparupdate::{MemoryDataset, UpdatableDataset};
///
/// let ex = NamedNode::new("http://example.com")?;
/// let mut dataset = MemoryDataset::new();
/// dataset.add_graph(ex.clone().into(), Graph::new());
/// assert!(dataset.has_graph(&ex.clone().into()));
/// dataset.discard()?;
/// assert!(!dataset.has_graph(&ex.into()));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    committed: FxHashMap<GraphName, Graph>,
    pending: FxHashMap<GraphName, Option<Graph>>,
    active: Vec<GraphSelection>,
}

impl MemoryDataset {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if there are changes waiting for a flush.
    #[inline]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns all the quads of the dataset, including the pending changes.
    pub fn quads(&self) -> Vec<Quad> {
        self.graph_names()
            .into_iter()
            .flat_map(|name| {
                self.graph(&name)
                    .into_iter()
                    .flat_map(Graph::iter)
                    .map(move |t| t.into_owned().in_graph(name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl UpdatableDataset for MemoryDataset {
    fn has_graph(&self, name: &GraphName) -> bool {
        match self.pending.get(name) {
            Some(graph) => graph.is_some(),
            None => self.committed.contains_key(name),
        }
    }

    fn graph(&self, name: &GraphName) -> Option<&Graph> {
        match self.pending.get(name) {
            Some(graph) => graph.as_ref(),
            None => self.committed.get(name),
        }
    }

    fn graph_mut(&mut self, name: &GraphName) -> Option<&mut Graph> {
        if !self.pending.contains_key(name) {
            let graph = self.committed.get(name)?.clone();
            self.pending.insert(name.clone(), Some(graph));
        }
        self.pending.get_mut(name)?.as_mut()
    }

    fn add_graph(&mut self, name: GraphName, graph: Graph) -> bool {
        if let Some(existing) = self.graph_mut(&name) {
            existing.extend(graph.iter());
            false
        } else {
            self.pending.insert(name, Some(graph));
            true
        }
    }

    fn remove_graph(&mut self, name: &GraphName) -> bool {
        if !self.has_graph(name) {
            return false;
        }
        if self.committed.contains_key(name) {
            self.pending.insert(name.clone(), None);
        } else {
            self.pending.remove(name);
        }
        true
    }

    fn graph_names(&self) -> Vec<GraphName> {
        let mut names = self
            .committed
            .keys()
            .filter(|name| !self.pending.contains_key(*name))
            .chain(
                self.pending
                    .iter()
                    .filter_map(|(name, graph)| graph.is_some().then_some(name)),
            )
            .cloned()
            .collect::<Vec<_>>();
        names.sort_by_cached_key(ToString::to_string);
        names
    }

    fn set_active_graph(&mut self, selection: GraphSelection) {
        self.active.push(selection);
    }

    fn reset_active_graph(&mut self) {
        self.active.pop();
    }

    fn active_graph(&self) -> GraphSelection {
        self.active.last().cloned().unwrap_or_default()
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        for (name, graph) in take(&mut self.pending) {
            if let Some(graph) = graph {
                self.committed.insert(name, graph);
            } else {
                self.committed.remove(&name);
            }
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<(), StorageError> {
        self.pending.clear();
        Ok(())
    }
}

impl FromIterator<Quad> for MemoryDataset {
    /// Builds a dataset whose quads are already committed.
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        let mut committed = FxHashMap::<GraphName, Graph>::default();
        for quad in iter {
            committed
                .entry(quad.graph_name)
                .or_default()
                .insert(&Triple::new(quad.subject, quad.predicate, quad.object));
        }
        Self {
            committed,
            ..Self::default()
        }
    }
}
