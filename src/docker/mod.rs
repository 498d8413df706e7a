// Docker plumbing: the daemon API seam and its CLI transport.

pub mod classify;
pub mod cli;
pub mod daemon;
pub mod engine;
pub mod run;
pub mod types;

pub use cli::DockerCli;
pub use daemon::{Daemon, DaemonError};
pub use engine::ensure_available;
pub use types::{CancelToken, CreateSpec, ExecOutput, HealthCheck, Mount, PortBinding};
