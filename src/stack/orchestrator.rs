use std::fmt;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::docker::{CancelToken, Daemon};

use super::descriptor::{Descriptor, LifecycleState};
use super::error::{Result, StackError};
use super::handle::{Cause, RunEvent, RunHandle};
use super::health::{CancellableSleep, HealthPolicy, Sleeper};

/// Label the daemon (and compose tooling) groups containers by.
pub const PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label recording which stackup version created a container.
pub const VERSION_LABEL: &str = "io.stackup.version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Shared network every container joins.
    pub network: String,
    /// Labels stamped on every created container.
    pub labels: Vec<(String, String)>,
    pub health: HealthPolicy,
}

impl Settings {
    pub fn new(project: &str, network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            labels: vec![
                (PROJECT_LABEL.to_string(), project.to_string()),
                (
                    VERSION_LABEL.to_string(),
                    env!("CARGO_PKG_VERSION").to_string(),
                ),
            ],
            health: HealthPolicy::default(),
        }
    }
}

/// Drives a daemon through bringing a stack up and tearing it down.
///
/// Clones share the daemon handle and the sequence lock, so a run and a
/// teardown never interleave their daemon calls.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) daemon: Arc<dyn Daemon>,
    pub(crate) settings: Arc<Settings>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    sequence: Arc<Mutex<()>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn emit(tx: &Sender<RunEvent>, index: usize, descriptor: &Descriptor) {
    // Nobody may be listening; ignore send errors.
    let _ = tx.send(RunEvent::Transition {
        index,
        name: descriptor.name.clone(),
        state: descriptor.state,
    });
}

impl Orchestrator {
    pub fn new(daemon: Arc<dyn Daemon>, settings: Settings) -> Self {
        Self {
            daemon,
            settings: Arc::new(settings),
            sleeper: Arc::new(CancellableSleep),
            sequence: Arc::new(Mutex::new(())),
        }
    }

    /// Replace how the health gate waits between polls.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bring up `descriptors` in order on a background thread.
    ///
    /// The order given is the dependency order. Cancelling `signal` (or the
    /// returned handle) stops the run before the next descriptor; containers
    /// already up are left for [`Orchestrator::teardown`].
    pub fn run(&self, descriptors: Vec<Descriptor>, signal: &CancelToken) -> RunHandle {
        let cancel = signal.child();
        let cause = Cause::default();
        let (tx, rx) = mpsc::channel();

        let orchestrator = self.clone();
        let thread_cancel = cancel.clone();
        let thread_cause = cause.clone();
        let thread = std::thread::spawn(move || {
            let mut descriptors = descriptors;
            orchestrator.run_inner(&mut descriptors, &thread_cancel, &thread_cause, &tx);
            let _ = tx.send(RunEvent::Finished);
            descriptors
        });

        RunHandle {
            cancel,
            cause,
            events: rx,
            thread,
        }
    }

    fn run_inner(
        &self,
        descriptors: &mut [Descriptor],
        cancel: &CancelToken,
        cause: &Cause,
        tx: &Sender<RunEvent>,
    ) {
        let _sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);

        let interrupted = |cancel: &CancelToken| StackError::Interrupted {
            reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
        };

        if cancel.is_cancelled() {
            warn!("container run interrupted before it began");
            cause.set_first(interrupted(cancel));
            return;
        }

        if let Err(e) = self.ensure_network() {
            error!("{e}");
            cause.set_first(e);
            return;
        }

        let total = descriptors.len();
        for (index, descriptor) in descriptors.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    remaining = total - index,
                    "container run interrupted; skipping remaining containers"
                );
                cause.set_first(interrupted(cancel));
                break;
            }

            debug!(index, name = %descriptor.name, "building container");
            if let Err(e) = self.bring_up(index, descriptor, cancel, tx) {
                // Once the run is cancelled, any step failure is the
                // interruption.
                let e = if cancel.is_cancelled() && !e.is_interrupted() {
                    debug!(index, name = %descriptor.name, error = %e, "step failed during shutdown");
                    interrupted(cancel)
                } else {
                    e
                };
                let e = e.in_descriptor(index, &descriptor.name);
                if e.is_interrupted() {
                    warn!("{e}");
                } else {
                    error!("{e}");
                }
                descriptor.state = LifecycleState::Failed;
                emit(tx, index, descriptor);
                cause.set_first(e);
            }
        }

        match cause.get() {
            None => info!(count = total, "ran containers"),
            Some(c) if c.is_interrupted() => warn!("container run interrupted"),
            Some(c) => warn!(cause = %c, "container run finished with failures"),
        }
    }

    /// Provision → start → health gate → after-start hook.
    fn bring_up(
        &self,
        index: usize,
        descriptor: &mut Descriptor,
        cancel: &CancelToken,
        tx: &Sender<RunEvent>,
    ) -> Result<()> {
        let id = self.create(descriptor)?;
        debug!(index, name = %descriptor.name, %id, "created container");
        emit(tx, index, descriptor);

        self.start(descriptor)?;
        debug!(index, name = %descriptor.name, "started container");
        emit(tx, index, descriptor);

        let gate = self.await_healthy(descriptor, cancel);
        emit(tx, index, descriptor);
        gate?;

        self.run_hook(descriptor)?;
        emit(tx, index, descriptor);
        Ok(())
    }

    fn run_hook(&self, descriptor: &mut Descriptor) -> Result<()> {
        let Some(hook) = descriptor.after_start.clone() else {
            descriptor.state = LifecycleState::Active;
            return Ok(());
        };
        debug!(name = %descriptor.name, "running after-start hook");
        descriptor.state = LifecycleState::HookRun;
        let output = hook
            .call(self, descriptor)
            .map_err(|source| StackError::Hook {
                name: descriptor.name.clone(),
                source: Box::new(source),
            })?;
        debug!(
            name = %descriptor.name,
            output = %output.replace('\n', "\\n"),
            "ran after-start hook"
        );
        descriptor.state = LifecycleState::Active;
        Ok(())
    }

    /// Stop and remove every container that got far enough, newest first.
    ///
    /// Every descriptor is attempted once per call. Failures are logged and
    /// collected, never raised; daemon calls give up once `deadline` passes.
    pub fn teardown(&self, descriptors: &mut [Descriptor], deadline: Instant) -> Vec<StackError> {
        let _sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let mut errors = Vec::new();

        debug!(count = descriptors.len(), "tearing down containers");
        for (index, descriptor) in descriptors.iter_mut().enumerate().rev() {
            if descriptor.started {
                debug!(index, name = %descriptor.name, "stopping container");
                match self.daemon.container_stop(descriptor.id(), Some(deadline)) {
                    Ok(()) => {
                        debug!(index, name = %descriptor.name, "stopped container");
                        descriptor.state = LifecycleState::Stopped;
                    }
                    Err(source) => {
                        let e = StackError::Stop {
                            name: descriptor.name.clone(),
                            source,
                        }
                        .in_descriptor(index, &descriptor.name);
                        error!("{e}");
                        errors.push(e);
                    }
                }
            } else {
                debug!(index, name = %descriptor.name, "skipping stop: was not started");
            }

            if let Some(id) = descriptor.created_id.clone() {
                debug!(index, name = %descriptor.name, "removing container");
                match self.daemon.container_remove(&id, Some(deadline)) {
                    Ok(()) => {
                        debug!(index, name = %descriptor.name, "removed container");
                        descriptor.state = LifecycleState::Removed;
                    }
                    Err(source) => {
                        let e = StackError::Remove {
                            name: descriptor.name.clone(),
                            source,
                        }
                        .in_descriptor(index, &descriptor.name);
                        error!("{e}");
                        errors.push(e);
                    }
                }
            } else {
                debug!(index, name = %descriptor.name, "skipping removal: was not created");
            }
        }
        errors
    }
}
