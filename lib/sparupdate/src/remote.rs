use crate::command::{UpdateCommand, UpdateCommandSet};
use crate::error::UpdateEvaluationError;
use crate::http::Client;
use crate::processor::UpdateProcessor;
use std::io;
use std::time::{Duration, Instant};
use tracing::debug;

/// A SPARQL update service.
pub trait UpdateEndpoint: Send + Sync {
    /// Sends a SPARQL update in its textual form.
    fn update(&self, update: &str) -> io::Result<()>;
}

/// An [`UpdateEndpoint`] reached with the [SPARQL 1.1 protocol](https://www.w3.org/TR/sparql11-protocol/#update-operation),
/// the update being `POST`ed directly.
///
/// Without the `http-client` feature every update fails with an [`io::ErrorKind::Unsupported`] error.
#[derive(Clone)]
pub struct HttpUpdateEndpoint {
    endpoint: String,
    client: Client,
}

impl HttpUpdateEndpoint {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Option<Duration>,
        redirection_limit: usize,
    ) -> io::Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: Client::new(timeout, redirection_limit)?,
        })
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl UpdateEndpoint for HttpUpdateEndpoint {
    fn update(&self, update: &str) -> io::Result<()> {
        self.client.post(
            &self.endpoint,
            update.as_bytes().to_vec(),
            "application/sparql-update",
        )
    }
}

/// Forwards updates to a remote [`UpdateEndpoint`].
///
/// Commands are serialized back to SPARQL and sent in a single request per command set.
/// The remote service is in charge of atomicity: [`flush`](UpdateProcessor::flush) and
/// [`discard`](UpdateProcessor::discard) do nothing.
///
/// ```
/// use sparupdate::{RemoteUpdateProcessor, UpdateCommandSet, UpdateProcessor};
/// use std::io;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<String>>);
///
/// impl sparupdate::UpdateEndpoint for Recorder {
///     fn update(&self, update: &str) -> io::Result<()> {
///         self.0.lock().unwrap().push(update.to_owned());
///         Ok(())
///     }
/// }
///
/// let processor = RemoteUpdateProcessor::new(Recorder::default());
/// let mut commands = UpdateCommandSet::parse("CLEAR DEFAULT", None)?;
/// processor.process_command_set(&mut commands)?;
/// assert!(commands.update_execution_time().is_some());
/// assert_eq!(processor.endpoint().0.lock().unwrap().len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct RemoteUpdateProcessor<E: UpdateEndpoint> {
    endpoint: E,
}

impl<E: UpdateEndpoint> RemoteUpdateProcessor<E> {
    #[inline]
    pub fn new(endpoint: E) -> Self {
        Self { endpoint }
    }

    #[inline]
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    fn send(&self, update: &str) -> Result<(), UpdateEvaluationError> {
        debug!(update, "sending update to the remote endpoint");
        self.endpoint.update(update)?;
        Ok(())
    }
}

impl<E: UpdateEndpoint> UpdateProcessor for RemoteUpdateProcessor<E> {
    fn process_command(&self, command: &UpdateCommand) -> Result<(), UpdateEvaluationError> {
        self.send(&command.to_string())
    }

    fn process_command_set(
        &self,
        commands: &mut UpdateCommandSet,
    ) -> Result<(), UpdateEvaluationError> {
        let start = Instant::now();
        commands.set_update_execution_time(None);
        let result = self.send(&commands.to_string());
        let elapsed = start.elapsed();
        commands.set_update_execution_time(Some(elapsed));
        debug!(?elapsed, success = result.is_ok(), "remote update executed");
        result
    }

    fn flush(&self) -> Result<(), UpdateEvaluationError> {
        Ok(())
    }

    fn discard(&self) -> Result<(), UpdateEvaluationError> {
        Ok(())
    }
}
