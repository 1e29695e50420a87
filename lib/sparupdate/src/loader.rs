use crate::error::UpdateEvaluationError;
use crate::http::Client;
use oxrdf::{Graph, NamedNode, Triple};
use oxrdfio::{RdfFormat, RdfParser};
use std::io::{self, Read};
use std::time::Duration;

const ACCEPTED_CONTENT_TYPES: &str = "application/n-triples, text/turtle, application/rdf+xml";

/// Fetches the graphs `LOAD` commands read from.
pub trait GraphLoader: Send + Sync {
    /// Fetches and parses the document identified by `source`.
    ///
    /// Named graphs of the document are ignored.
    fn load(&self, source: &NamedNode) -> Result<Graph, UpdateEvaluationError>;
}

impl<F: Fn(&NamedNode) -> Result<Graph, UpdateEvaluationError> + Send + Sync> GraphLoader for F {
    #[inline]
    fn load(&self, source: &NamedNode) -> Result<Graph, UpdateEvaluationError> {
        self(source)
    }
}

/// A [`GraphLoader`] doing HTTP `GET` requests.
///
/// Without the `http-client` feature every load fails with an [`io::ErrorKind::Unsupported`] error.
#[derive(Clone)]
pub struct HttpGraphLoader {
    client: Client,
}

impl HttpGraphLoader {
    pub fn new(timeout: Option<Duration>, redirection_limit: usize) -> io::Result<Self> {
        Ok(Self {
            client: Client::new(timeout, redirection_limit)?,
        })
    }
}

impl GraphLoader for HttpGraphLoader {
    fn load(&self, source: &NamedNode) -> Result<Graph, UpdateEvaluationError> {
        let (content_type, body) = self.client.get(source.as_str(), ACCEPTED_CONTENT_TYPES)?;
        parse_graph(source, &content_type, body)
    }
}

/// Parses a document of the given media type, resolving relative IRIs against `source`.
///
/// Blank nodes are renamed so that two loads of the same document do not share them.
pub fn parse_graph(
    source: &NamedNode,
    content_type: &str,
    reader: impl Read,
) -> Result<Graph, UpdateEvaluationError> {
    let format = RdfFormat::from_media_type(content_type)
        .ok_or_else(|| UpdateEvaluationError::UnsupportedContentType(content_type.into()))?;
    let parser = RdfParser::from_format(format)
        .rename_blank_nodes()
        .without_named_graphs()
        .with_base_iri(source.as_str())
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid URL: {source}: {e}"),
            )
        })?;
    let mut graph = Graph::new();
    for quad in parser.for_reader(reader) {
        graph.insert(&Triple::from(quad?));
    }
    Ok(graph)
}
