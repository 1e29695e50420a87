#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]

mod algebra;
mod capabilities;
mod command;
mod context;
mod dataset;
mod error;
mod generic;
mod http;
mod loader;
mod memory;
pub mod model;
mod options;
mod processor;
mod remote;
mod storage;
mod template;

pub use crate::algebra::{AlgebraOptimiser, Multiset, PatternEvaluator, QueryPatternEvaluator};
pub use crate::capabilities::{IoBehaviour, IoFacet};
pub use crate::command::{
    ConstructTemplate, GraphSpecifier, GraphTemplate, UpdateCommand, UpdateCommandKind,
    UpdateCommandSet, WhereClause,
};
pub use crate::context::{UpdateEvaluationContext, effective_timeout};
pub use crate::dataset::{GraphSelection, MemoryDataset, UpdatableDataset};
pub use crate::error::{CorruptionError, StorageError, UpdateEvaluationError};
pub use crate::generic::StorageUpdateProcessor;
pub use crate::loader::{GraphLoader, HttpGraphLoader, parse_graph};
pub use crate::memory::DatasetUpdateProcessor;
pub use crate::options::UpdateOptions;
pub use crate::processor::UpdateProcessor;
pub use crate::remote::{HttpUpdateEndpoint, RemoteUpdateProcessor, UpdateEndpoint};
pub use crate::storage::{QueryableStorage, StorageBackend, StorageProvider, UpdateableStorage};
pub use crate::template::{
    GraphTriples, construct_triples, resolve_graph_specifier, validate_data_pattern,
};
pub use spargebra::SparqlSyntaxError;
