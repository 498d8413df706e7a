use std::time::Instant;

use thiserror::Error;

use super::types::{CreateSpec, ExecOutput};

/// An error reported by the container daemon.
///
/// The daemon does not expose typed conditions, so the message text is all
/// there is; see [`super::classify`] for recognising known conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DaemonError {
    pub message: String,
}

impl DaemonError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The subset of the container daemon API the orchestrator drives.
///
/// `container` arguments accept either a container ID or its name.
/// Calls taking a `deadline` must give up once it has passed.
pub trait Daemon: Send + Sync {
    /// Returns the network ID.
    fn network_inspect(&self, name: &str) -> Result<String, DaemonError>;

    /// Create a bridge-scoped, attachable, dual-stack network. Returns its ID.
    fn network_create(&self, name: &str) -> Result<String, DaemonError>;

    /// Returns the image ID.
    fn image_inspect(&self, image: &str) -> Result<String, DaemonError>;

    /// Pull an image, handing each progress line to `progress`.
    fn image_pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<(), DaemonError>;

    /// Returns the new container's ID.
    fn container_create(&self, spec: &CreateSpec<'_>) -> Result<String, DaemonError>;

    fn container_start(&self, container: &str) -> Result<(), DaemonError>;

    fn container_stop(&self, container: &str, deadline: Option<Instant>)
    -> Result<(), DaemonError>;

    /// Force-remove a container together with its anonymous volumes.
    fn container_remove(
        &self,
        container: &str,
        deadline: Option<Instant>,
    ) -> Result<(), DaemonError>;

    /// The container's health status (`starting`, `healthy`, `unhealthy`),
    /// or an empty string when the daemon tracks none.
    fn health_status(&self, container: &str) -> Result<String, DaemonError>;

    /// Extract a tar stream into the container's filesystem at `dest`.
    fn copy_archive(&self, container: &str, dest: &str, archive: &[u8])
    -> Result<(), DaemonError>;

    /// Run a command in a started container without a TTY.
    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, DaemonError>;
}
