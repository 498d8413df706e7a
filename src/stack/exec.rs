use tracing::debug;

use super::error::{Result, StackError};
use super::orchestrator::Orchestrator;

impl Orchestrator {
    /// Run `command` inside a started container and return its combined
    /// stdout and stderr.
    ///
    /// A non-zero exit is an [`StackError::ExecFailed`] that still carries
    /// the captured output.
    pub fn exec<S: AsRef<str>>(&self, container: &str, command: &[S]) -> Result<String> {
        let command: Vec<String> = command.iter().map(|s| s.as_ref().to_string()).collect();
        debug!(container, program = command.first().map(String::as_str), "exec");
        let out = self
            .daemon
            .exec(container, &command)
            .map_err(|source| StackError::Exec {
                container: container.to_string(),
                source,
            })?;
        if out.exit_code != 0 {
            return Err(StackError::ExecFailed {
                exit_code: out.exit_code,
                output: out.output,
            });
        }
        Ok(out.output)
    }
}
