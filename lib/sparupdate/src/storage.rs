//! Interfaces of the RDF stores the [`StorageUpdateProcessor`](crate::StorageUpdateProcessor) updates.
//!
//! A store only has to load and save whole graphs. Every other primitive is optional and
//! advertised through [`StorageProvider::capabilities`] and the `*_supported` methods.

use crate::algebra::Multiset;
use crate::capabilities::IoBehaviour;
use crate::error::StorageError;
use oxrdf::{Graph, GraphName, Triple};
use spargebra::Query;

/// A store giving access to whole graphs.
pub trait StorageProvider: Send + Sync {
    /// The input/output facets of the store.
    fn capabilities(&self) -> IoBehaviour;

    #[inline]
    fn is_read_only(&self) -> bool {
        false
    }

    /// Checks if [`update_graph`](Self::update_graph) is implemented.
    #[inline]
    fn update_supported(&self) -> bool {
        false
    }

    /// Checks if [`delete_graph`](Self::delete_graph) is implemented.
    #[inline]
    fn delete_supported(&self) -> bool {
        false
    }

    /// Checks if [`list_graph_names`](Self::list_graph_names) is implemented.
    #[inline]
    fn list_graphs_supported(&self) -> bool {
        false
    }

    /// Adds the triples of the graph `name` to `graph`.
    ///
    /// A missing graph is not an error, nothing is added.
    fn load_graph(&self, graph: &mut Graph, name: &GraphName) -> Result<(), StorageError>;

    /// Writes `graph` as the graph `name`.
    ///
    /// Depending on the [`IoFacet::OverwriteDefault`](crate::IoFacet::OverwriteDefault) and
    /// [`IoFacet::OverwriteNamed`](crate::IoFacet::OverwriteNamed) facets the previous content
    /// is replaced or merged.
    fn save_graph(&self, name: &GraphName, graph: &Graph) -> Result<(), StorageError>;

    fn delete_graph(&self, _name: &GraphName) -> Result<(), StorageError> {
        Err(StorageError::unsupported("graph deletion"))
    }

    fn list_graph_names(&self) -> Result<Vec<GraphName>, StorageError> {
        Err(StorageError::unsupported("graph listing"))
    }

    /// Adds and removes triples from the graph `name` without rewriting it.
    fn update_graph(
        &self,
        _name: &GraphName,
        _additions: &[Triple],
        _removals: &[Triple],
    ) -> Result<(), StorageError> {
        Err(StorageError::unsupported("triple level updates"))
    }
}

/// A store able to evaluate SPARQL queries.
pub trait QueryableStorage: StorageProvider {
    /// Evaluates a `SELECT` query and returns its solutions.
    fn query(&self, query: &Query) -> Result<Multiset, StorageError>;
}

/// A store natively executing SPARQL updates.
pub trait UpdateableStorage: StorageProvider {
    /// Executes a SPARQL update given in its textual form.
    fn update(&self, update: &str) -> Result<(), StorageError>;
}

/// The way a store can be updated, chosen when the processor is built.
pub enum StorageBackend {
    /// Updates are forwarded to the store.
    NativeUpdate(Box<dyn UpdateableStorage>),
    /// Pattern based commands get their solutions from the store.
    Queryable(Box<dyn QueryableStorage>),
    /// Only the commands that do not need a `WHERE` evaluation are supported.
    Basic(Box<dyn StorageProvider>),
}

impl StorageBackend {
    #[inline]
    pub fn native_update(storage: impl UpdateableStorage + 'static) -> Self {
        Self::NativeUpdate(Box::new(storage))
    }

    #[inline]
    pub fn queryable(storage: impl QueryableStorage + 'static) -> Self {
        Self::Queryable(Box::new(storage))
    }

    #[inline]
    pub fn basic(storage: impl StorageProvider + 'static) -> Self {
        Self::Basic(Box::new(storage))
    }

    /// The store primitives, whatever the backend kind.
    pub fn provider(&self) -> &dyn StorageProvider {
        match self {
            Self::NativeUpdate(storage) => storage.as_ref(),
            Self::Queryable(storage) => storage.as_ref(),
            Self::Basic(storage) => storage.as_ref(),
        }
    }

    /// The query interface, if the store has one.
    pub fn queryable_storage(&self) -> Option<&dyn QueryableStorage> {
        match self {
            Self::Queryable(storage) => Some(storage.as_ref()),
            Self::NativeUpdate(_) | Self::Basic(_) => None,
        }
    }
}
