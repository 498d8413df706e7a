//! Bringing a stack of service containers up in order and back down.

mod descriptor;
mod error;
mod exec;
mod handle;
mod health;
mod inject;
mod orchestrator;
mod provision;
mod start;
#[cfg(test)]
pub(crate) mod testing;

pub use descriptor::{AfterStart, Descriptor, EmbeddedFile, LifecycleState};
pub use error::{Result, StackError};
pub use handle::{RunEvent, RunHandle, RunOutcome};
pub use health::{CancellableSleep, HealthPolicy, Sleeper};
pub use inject::build_archive;
pub use orchestrator::{Orchestrator, PROJECT_LABEL, Settings, VERSION_LABEL};
