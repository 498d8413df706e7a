//! In-memory daemon for exercising the orchestrator without docker.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::docker::{CancelToken, CreateSpec, Daemon, DaemonError, ExecOutput};

use super::health::Sleeper;
use super::orchestrator::{Orchestrator, Settings};

/// Daemon operations whose results can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    NetworkInspect,
    NetworkCreate,
    ImageInspect,
    ImagePull,
    Create,
    Start,
    Stop,
    Remove,
    CopyArchive,
}

/// A recorded daemon call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NetworkInspect(String),
    NetworkCreate(String),
    ImageInspect(String),
    ImagePull(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Health(String),
    CopyArchive { container: String, dest: String },
    Exec { container: String, command: Vec<String> },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    scripts: HashMap<Op, VecDeque<Result<String, DaemonError>>>,
    health: VecDeque<Result<String, DaemonError>>,
    exec: VecDeque<Result<ExecOutput, DaemonError>>,
    archives: Vec<Vec<u8>>,
    sleeps: Vec<Duration>,
    network_gate: Option<Receiver<()>>,
}

/// Records every call; scripted results are consumed in order, after which
/// each operation succeeds.
#[derive(Clone, Default)]
pub struct FakeDaemon(Arc<Mutex<State>>);

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// An orchestrator on network `stack` that records sleeps instead of
    /// sleeping.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::new(self.clone()), Settings::new("stack", "stack"))
            .with_sleeper(Arc::new(RecordingSleeper(self.clone())))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    pub fn archives(&self) -> Vec<Vec<u8>> {
        self.state().archives.clone()
    }

    pub fn script(&self, op: Op, results: Vec<Result<String, DaemonError>>) {
        self.state().scripts.entry(op).or_default().extend(results);
    }

    pub fn script_health<'a>(&self, statuses: impl IntoIterator<Item = &'a str>) {
        self.state()
            .health
            .extend(statuses.into_iter().map(|s| Ok(s.to_string())));
    }

    pub fn script_health_results(&self, results: Vec<Result<String, DaemonError>>) {
        self.state().health.extend(results);
    }

    pub fn script_exec(&self, results: Vec<Result<ExecOutput, DaemonError>>) {
        self.state().exec.extend(results);
    }

    /// Make the next network inspection block until the returned sender
    /// fires (or is dropped).
    pub fn block_network_inspect(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.state().network_gate = Some(rx);
        tx
    }

    fn record(&self, op: Op, call: Call) -> Result<String, DaemonError> {
        let mut state = self.state();
        state.calls.push(call);
        state
            .scripts
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(String::new()))
    }
}

struct RecordingSleeper(FakeDaemon);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        self.0.state().sleeps.push(duration);
        cancel.is_cancelled()
    }
}

impl Daemon for FakeDaemon {
    fn network_inspect(&self, name: &str) -> Result<String, DaemonError> {
        let gate = self.state().network_gate.take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.record(Op::NetworkInspect, Call::NetworkInspect(name.into()))
            .map(|id| if id.is_empty() { format!("net-{name}") } else { id })
    }

    fn network_create(&self, name: &str) -> Result<String, DaemonError> {
        self.record(Op::NetworkCreate, Call::NetworkCreate(name.into()))
            .map(|id| if id.is_empty() { format!("net-{name}") } else { id })
    }

    fn image_inspect(&self, image: &str) -> Result<String, DaemonError> {
        self.record(Op::ImageInspect, Call::ImageInspect(image.into()))
            .map(|id| if id.is_empty() { "sha256:0".to_string() } else { id })
    }

    fn image_pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<(), DaemonError> {
        self.record(Op::ImagePull, Call::ImagePull(image.into()))?;
        progress("Status: Downloaded newer image");
        Ok(())
    }

    fn container_create(&self, spec: &CreateSpec<'_>) -> Result<String, DaemonError> {
        let name = spec.name;
        self.record(Op::Create, Call::Create(name.into()))
            .map(|id| if id.is_empty() { format!("id-{name}") } else { id })
    }

    fn container_start(&self, container: &str) -> Result<(), DaemonError> {
        self.record(Op::Start, Call::Start(container.into()))
            .map(drop)
    }

    fn container_stop(&self, container: &str, _: Option<Instant>) -> Result<(), DaemonError> {
        self.record(Op::Stop, Call::Stop(container.into()))
            .map(drop)
    }

    fn container_remove(&self, container: &str, _: Option<Instant>) -> Result<(), DaemonError> {
        self.record(Op::Remove, Call::Remove(container.into()))
            .map(drop)
    }

    fn health_status(&self, container: &str) -> Result<String, DaemonError> {
        let mut state = self.state();
        state.calls.push(Call::Health(container.into()));
        state
            .health
            .pop_front()
            .unwrap_or_else(|| Ok("healthy".to_string()))
    }

    fn copy_archive(&self, container: &str, dest: &str, archive: &[u8]) -> Result<(), DaemonError> {
        let result = self.record(
            Op::CopyArchive,
            Call::CopyArchive {
                container: container.into(),
                dest: dest.into(),
            },
        );
        if result.is_ok() {
            self.state().archives.push(archive.to_vec());
        }
        result.map(drop)
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, DaemonError> {
        let mut state = self.state();
        state.calls.push(Call::Exec {
            container: container.into(),
            command: command.to_vec(),
        });
        state.exec.pop_front().unwrap_or_else(|| {
            Ok(ExecOutput {
                exit_code: 0,
                output: String::new(),
            })
        })
    }
}
