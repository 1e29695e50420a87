use oxrdf::GraphName;
use oxrdfio::RdfParseError;
use spareval::QueryEvaluationError;
use std::convert::Infallible;
use std::error::Error;
use std::io;
use std::sync::PoisonError;
use std::time::Duration;

/// An error related to storage operations (graph loads, saves, deletions...).
///
/// Storage providers return this error from their primitives.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Error from the OS I/O layer or from a remote transport.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error related to data corruption.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    #[doc(hidden)]
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl StorageError {
    /// Builds an error for a primitive the provider does not implement.
    #[inline]
    pub fn unsupported(operation: &str) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("The storage does not support {operation}"),
        ))
    }
}

impl From<StorageError> for io::Error {
    #[inline]
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(error) => error,
            StorageError::Corruption(error) => error.into(),
            StorageError::Other(error) => Self::other(error),
        }
    }
}

/// An error returned if some content in the dataset is corrupted.
#[derive(Debug, thiserror::Error)]
pub enum CorruptionError {
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl CorruptionError {
    /// Builds an error from another error.
    #[inline]
    pub fn new(error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self::Other(error.into())
    }

    /// Builds an error from a printable error message.
    #[inline]
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Msg(msg.into())
    }
}

impl From<CorruptionError> for io::Error {
    #[inline]
    fn from(error: CorruptionError) -> Self {
        Self::new(io::ErrorKind::InvalidData, error)
    }
}

/// A poisoned dataset lock means a writer panicked in the middle of a mutation.
pub(crate) fn poison_corruption_error<T>(_: PoisonError<T>) -> StorageError {
    CorruptionError::msg("The dataset lock has been poisoned by a panicking writer").into()
}

/// An error from SPARQL UPDATE evaluation.
///
/// Whether a `SILENT` command may swallow the error is a property of the variant,
/// see [`is_suppressible`](Self::is_suppressible).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum UpdateEvaluationError {
    /// An error from the storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An error while fetching an external resource or talking to a remote endpoint.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// An error while parsing an external RDF file.
    #[error(transparent)]
    GraphParsing(#[from] RdfParseError),
    /// The given content media type returned from an HTTP response is not supported (`LOAD`).
    #[error("The content media type {0} is not supported")]
    UnsupportedContentType(String),
    /// Error when `CREATE` tries to create an already existing graph.
    #[error("The graph {0} already exists")]
    GraphAlreadyExists(GraphName),
    /// Error when a command requires a graph that does not exist.
    #[error("The graph {0} does not exist")]
    GraphDoesNotExist(GraphName),
    /// The storage has no default graph or no named graphs and can't address the given graph.
    #[error("The storage can't address the graph {0}")]
    GraphNotAddressable(GraphName),
    /// An `INSERT DATA` or `DELETE DATA` block is not made of concrete triples only.
    #[error("Invalid data block: {0}")]
    InvalidDataPattern(String),
    /// A `GRAPH` clause of a template uses something else than an IRI or a variable.
    #[error("Unsupported graph specifier {0} in a template")]
    UnsupportedGraphSpecifier(String),
    /// An error while evaluating the `WHERE` pattern of a command.
    #[error(transparent)]
    Query(#[from] QueryEvaluationError),
    /// The storage lacks the primitives needed to approximate a graph management command.
    #[error("{0}")]
    NoApproximation(String),
    /// The target does not provide what the command requires.
    #[error("{0}")]
    Unsupported(String),
    /// The storage is read-only and can't be updated.
    #[error("The storage is read-only")]
    ReadOnlyStorage,
    /// A flush was attempted after a command of the current transaction failed.
    #[error(
        "Unable to commit since one or more commands executed in the current transaction failed"
    )]
    UncommittableTransaction,
    /// The command set ran for longer than its allowed execution time.
    #[error(
        "Update execution time exceeded the timeout of {}ms, update aborted",
        .0.as_millis()
    )]
    Timeout(Duration),
    #[doc(hidden)]
    #[error(transparent)]
    Unexpected(Box<dyn Error + Send + Sync>),
}

impl UpdateEvaluationError {
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub(crate) fn no_approximation(msg: impl Into<String>) -> Self {
        Self::NoApproximation(msg.into())
    }

    /// Returns `true` if a `SILENT` command is allowed to swallow this error.
    ///
    /// Runtime failures of the target (I/O, parsing, missing, already existing or unaddressable
    /// graphs) are suppressible, and so is a graph management command the storage can't
    /// approximate. Validation errors, query failures and timeouts never are.
    #[inline]
    pub fn is_suppressible(&self) -> bool {
        match self {
            Self::Storage(_)
            | Self::Io(_)
            | Self::GraphParsing(_)
            | Self::UnsupportedContentType(_)
            | Self::GraphAlreadyExists(_)
            | Self::GraphDoesNotExist(_)
            | Self::GraphNotAddressable(_)
            | Self::NoApproximation(_) => true,
            Self::InvalidDataPattern(_)
            | Self::Query(_)
            | Self::UnsupportedGraphSpecifier(_)
            | Self::Unsupported(_)
            | Self::ReadOnlyStorage
            | Self::UncommittableTransaction
            | Self::Timeout(_)
            | Self::Unexpected(_) => false,
        }
    }

    /// Returns `true` if this error is a timeout.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<Infallible> for UpdateEvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}

impl From<UpdateEvaluationError> for io::Error {
    #[inline]
    fn from(error: UpdateEvaluationError) -> Self {
        match error {
            UpdateEvaluationError::Storage(error) => error.into(),
            UpdateEvaluationError::Io(error) => error,
            UpdateEvaluationError::GraphParsing(error) => error.into(),
            UpdateEvaluationError::Unexpected(error) => match error.downcast() {
                Ok(error) => *error,
                Err(error) => Self::other(error),
            },
            UpdateEvaluationError::Timeout(_) => Self::new(io::ErrorKind::TimedOut, error),
            UpdateEvaluationError::Query(error) => Self::other(error),
            UpdateEvaluationError::NoApproximation(_) | UpdateEvaluationError::Unsupported(_) => {
                Self::new(io::ErrorKind::Unsupported, error)
            }
            UpdateEvaluationError::ReadOnlyStorage => {
                Self::new(io::ErrorKind::PermissionDenied, error)
            }
            UpdateEvaluationError::UncommittableTransaction => Self::other(error),
            UpdateEvaluationError::UnsupportedContentType(_)
            | UpdateEvaluationError::GraphAlreadyExists(_)
            | UpdateEvaluationError::GraphDoesNotExist(_)
            | UpdateEvaluationError::GraphNotAddressable(_)
            | UpdateEvaluationError::InvalidDataPattern(_)
            | UpdateEvaluationError::UnsupportedGraphSpecifier(_) => {
                Self::new(io::ErrorKind::InvalidInput, error)
            }
        }
    }
}
