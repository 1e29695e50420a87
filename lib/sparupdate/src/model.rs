//! RDF terms and graphs from [OxRDF](https://crates.io/crates/oxrdf) together with the
//! [spargebra](https://crates.io/crates/spargebra) patterns update commands are built from.
//!
//! ```
//! use sparupdate::model::*;
//!
//! let ex = NamedNode::new("http://example.com")?;
//! let mut graph = Graph::default();
//! graph.insert(TripleRef::new(&ex, &ex, &ex));
//! assert_eq!(graph.len(), 1);
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```

pub use oxrdf::*;
pub use spargebra::algebra::{GraphPattern, GraphTarget};
pub use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
