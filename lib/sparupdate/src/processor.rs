use crate::command::{UpdateCommand, UpdateCommandSet};
use crate::error::UpdateEvaluationError;
use tracing::warn;

/// Executes SPARQL update commands against some target.
///
/// Implemented by [`DatasetUpdateProcessor`](crate::DatasetUpdateProcessor),
/// [`StorageUpdateProcessor`](crate::StorageUpdateProcessor) and
/// [`RemoteUpdateProcessor`](crate::RemoteUpdateProcessor).
pub trait UpdateProcessor {
    /// Executes a single command.
    fn process_command(&self, command: &UpdateCommand) -> Result<(), UpdateEvaluationError>;

    /// Executes the commands in order and records the [execution time](UpdateCommandSet::update_execution_time),
    /// even if the execution fails.
    fn process_command_set(
        &self,
        commands: &mut UpdateCommandSet,
    ) -> Result<(), UpdateEvaluationError>;

    /// Commits the pending changes.
    fn flush(&self) -> Result<(), UpdateEvaluationError>;

    /// Drops the pending changes.
    fn discard(&self) -> Result<(), UpdateEvaluationError>;
}

/// Swallows the error if the command is `SILENT` and the error may be suppressed.
pub(crate) fn suppress_if_silent(
    command: &UpdateCommand,
    result: Result<(), UpdateEvaluationError>,
) -> Result<(), UpdateEvaluationError> {
    match result {
        Err(error) if command.is_silent() && error.is_suppressible() => {
            warn!(command = %command.kind(), %error, "error ignored by a SILENT command");
            Ok(())
        }
        result => result,
    }
}
