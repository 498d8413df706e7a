use std::fmt;
use std::sync::Arc;

use crate::docker::{CreateSpec, HealthCheck, Mount, PortBinding};

use super::error::Result;
use super::orchestrator::Orchestrator;

/// Where a descriptor is in its lifecycle.
///
/// `Failed` is absorbing for a run; teardown moves any state that reached
/// `Created` on to `Stopped`/`Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Defined,
    Created,
    Started,
    HealthPending,
    Healthy,
    Unhealthy,
    HookRun,
    Active,
    Failed,
    Stopped,
    Removed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Defined => "defined",
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
            LifecycleState::HealthPending => "health-pending",
            LifecycleState::Healthy => "healthy",
            LifecycleState::Unhealthy => "unhealthy",
            LifecycleState::HookRun => "hook-run",
            LifecycleState::Active => "active",
            LifecycleState::Failed => "failed",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Removed => "removed",
        }
    }
}

/// A file placed into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub path: String,
    pub data: Vec<u8>,
}

type HookFn = dyn Fn(&Orchestrator, &Descriptor) -> Result<String> + Send + Sync;

/// Callback run once a container is confirmed healthy. Returns output
/// worth logging.
#[derive(Clone)]
pub struct AfterStart(Arc<HookFn>);

impl AfterStart {
    pub fn new(
        hook: impl Fn(&Orchestrator, &Descriptor) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(hook))
    }

    pub fn call(&self, orchestrator: &Orchestrator, descriptor: &Descriptor) -> Result<String> {
        (self.0)(orchestrator, descriptor)
    }
}

impl fmt::Debug for AfterStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AfterStart(..)")
    }
}

/// One service container: static definition plus what the orchestrator has
/// observed about it.
///
/// The runtime fields are only ever written by the orchestrator; teardown
/// decisions rest on them alone.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub name: String,
    pub image: String,
    pub embeds: Vec<EmbeddedFile>,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortBinding>,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub health_check: Option<HealthCheck>,
    pub after_start: Option<AfterStart>,

    pub(crate) created_id: Option<String>,
    pub(crate) started: bool,
    pub(crate) state: LifecycleState,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            embeds: Vec::new(),
            mounts: Vec::new(),
            ports: Vec::new(),
            entrypoint: Vec::new(),
            command: Vec::new(),
            env: Vec::new(),
            health_check: None,
            after_start: None,
            created_id: None,
            started: false,
            state: LifecycleState::Defined,
        }
    }

    pub fn embed(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.embeds.push(EmbeddedFile {
            path: path.into(),
            data: data.into(),
        });
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn port(mut self, port: PortBinding) -> Self {
        self.ports.push(port);
        self
    }

    pub fn entrypoint<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn command<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    pub fn health_check(mut self, check: HealthCheck) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn after_start(
        mut self,
        hook: impl Fn(&Orchestrator, &Descriptor) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.after_start = Some(AfterStart::new(hook));
        self
    }

    /// The daemon-assigned ID once created, else the name.
    pub fn id(&self) -> &str {
        self.created_id.as_deref().unwrap_or(&self.name)
    }

    pub fn created_id(&self) -> Option<&str> {
        self.created_id.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn create_spec<'a>(
        &'a self,
        network: &'a str,
        labels: &'a [(String, String)],
    ) -> CreateSpec<'a> {
        CreateSpec {
            name: &self.name,
            image: &self.image,
            network,
            labels,
            env: &self.env,
            ports: &self.ports,
            mounts: &self.mounts,
            entrypoint: &self.entrypoint,
            command: &self.command,
            health_check: self.health_check.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_is_defined_and_untouched() {
        let d = Descriptor::new("db", "postgres:17");
        assert_eq!(d.state(), LifecycleState::Defined);
        assert_eq!(d.created_id(), None);
        assert!(!d.is_started());
        assert_eq!(d.id(), "db");
    }

    #[test]
    fn id_prefers_created_identifier() {
        let mut d = Descriptor::new("db", "postgres:17");
        d.created_id = Some("abc123".into());
        assert_eq!(d.id(), "abc123");
    }

    #[test]
    fn builder_collects_configuration_in_order() {
        let d = Descriptor::new("kong", "kong:3.9.1")
            .embed("/var/tmp/kong.yml", "_format_version: '2.1'")
            .embed("/etc/kong/extra.conf", b"x".to_vec())
            .env("KONG_DATABASE", "off")
            .env("PGPORT", 5432)
            .entrypoint(["sh", "-c"])
            .command(["kong docker-start"]);
        assert_eq!(d.embeds[0].path, "/var/tmp/kong.yml");
        assert_eq!(d.embeds[1].data, b"x");
        assert_eq!(d.env, vec!["KONG_DATABASE=off", "PGPORT=5432"]);
        assert_eq!(d.entrypoint, vec!["sh", "-c"]);
        assert!(d.after_start.is_none());
    }

    #[test]
    fn create_spec_borrows_static_fields() {
        let labels = vec![("k".to_string(), "v".to_string())];
        let d = Descriptor::new("db", "postgres:17").command(["postgres"]);
        let spec = d.create_spec("stack", &labels);
        assert_eq!(spec.name, "db");
        assert_eq!(spec.network, "stack");
        assert_eq!(spec.command, ["postgres".to_string()]);
        assert!(spec.health_check.is_none());
    }
}
