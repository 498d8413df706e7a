use thiserror::Error;

use crate::docker::DaemonError;

#[derive(Debug, Error)]
pub enum StackError {
    // ── input / contract ─────────────────────────────────────────────
    #[error("invalid container path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("container {name} is already created")]
    AlreadyCreated { name: String },
    #[error("container {name} has not been created")]
    NotCreated { name: String },
    #[error("container {name} is already started")]
    AlreadyStarted { name: String },

    // ── daemon steps ─────────────────────────────────────────────────
    #[error("could not ensure network {name}: {source}")]
    Network { name: String, source: DaemonError },
    #[error("unable to inspect image {image}: {source}")]
    ImageInspect { image: String, source: DaemonError },
    #[error("unable to pull image {image}: {source}")]
    ImagePull { image: String, source: DaemonError },
    #[error("could not create container {name}: {source}")]
    Create { name: String, source: DaemonError },
    #[error("container name {name:?} conflicts and could not be removed: {source}")]
    ConflictUnresolved { name: String, source: DaemonError },
    #[error("could not create container {name} on second try: {source}")]
    CreateRetry { name: String, source: DaemonError },
    #[error("failed to create file {index} ({path}): {source}")]
    Inject {
        index: usize,
        path: String,
        source: Box<StackError>,
    },
    #[error("could not copy archive into {container}: {source}")]
    Copy {
        container: String,
        source: DaemonError,
    },
    #[error("could not build archive: {0}")]
    Archive(#[from] std::io::Error),
    #[error("could not start container {name}: {source}")]
    Start { name: String, source: DaemonError },
    #[error("could not inspect container {name}: {source}")]
    Inspect { name: String, source: DaemonError },
    #[error("could not stop container {name}: {source}")]
    Stop { name: String, source: DaemonError },
    #[error("could not remove container {name}: {source}")]
    Remove { name: String, source: DaemonError },
    #[error("could not exec in {container}: {source}")]
    Exec {
        container: String,
        source: DaemonError,
    },

    // ── health / hooks ───────────────────────────────────────────────
    #[error("container {name} reported unhealthy")]
    Unhealthy { name: String },
    #[error("container {name} is not healthy after {attempts} polls (last status {last_status:?})")]
    NotHealthy {
        name: String,
        attempts: u32,
        last_status: String,
    },
    #[error("command exited with code {exit_code}")]
    ExecFailed { exit_code: i32, output: String },
    #[error("after-start hook on {name}: {source}")]
    Hook {
        name: String,
        source: Box<StackError>,
    },

    // ── run control ──────────────────────────────────────────────────
    #[error("interrupted: {reason}")]
    Interrupted { reason: String },
    #[error("container {index} ({name}): {source}")]
    Descriptor {
        index: usize,
        name: String,
        source: Box<StackError>,
    },
}

impl StackError {
    /// Whether this error, or one it wraps, is an intentional interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            StackError::Interrupted { .. } => true,
            StackError::Descriptor { source, .. }
            | StackError::Hook { source, .. }
            | StackError::Inject { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }

    /// Output captured by a failed in-container command, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            StackError::ExecFailed { output, .. } => Some(output),
            StackError::Descriptor { source, .. } | StackError::Hook { source, .. } => {
                source.output()
            }
            _ => None,
        }
    }

    pub(crate) fn in_descriptor(self, index: usize, name: &str) -> Self {
        StackError::Descriptor {
            index,
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T, E = StackError> = std::result::Result<T, E>;
