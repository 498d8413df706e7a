use std::time::{Duration, Instant};

use serde::Deserialize;

use super::daemon::{Daemon, DaemonError};
use super::run::{self, CommandResult, DockerCommand};
use super::types::{CreateSpec, ExecOutput, HealthCheck};

/// Longest grace period handed to `docker stop`.
const MAX_STOP_GRACE: Duration = Duration::from_secs(10);

/// [`Daemon`] implementation that drives the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: Vec<String>) -> DockerCommand {
        DockerCommand::new(self.program.clone(), args)
    }

    /// Run to completion; only spawn failures and deadlines are errors here.
    fn invoke(
        &self,
        cmd: DockerCommand,
        on_stdout: impl FnMut(&str),
    ) -> Result<CommandResult, DaemonError> {
        let result = run::run(cmd, on_stdout).map_err(|e| DaemonError::new(format!("{e:#}")))?;
        if result.timed_out {
            return Err(DaemonError::new("docker call exceeded its deadline"));
        }
        Ok(result)
    }

    /// Run to completion and require a zero exit; returns trimmed stdout.
    fn check(&self, cmd: DockerCommand) -> Result<String, DaemonError> {
        let result = self.invoke(cmd, |_| {})?;
        if !result.success {
            return Err(failure(&result));
        }
        Ok(result.stdout.trim().to_string())
    }
}

fn failure(result: &CommandResult) -> DaemonError {
    let message = result.stderr.trim();
    if message.is_empty() {
        match result.exit_code {
            Some(code) => DaemonError::new(format!("docker exited with status {code}")),
            None => DaemonError::new("docker was terminated by a signal"),
        }
    } else {
        DaemonError::new(message)
    }
}

/// Exit status docker itself uses when it could not run the command.
const DOCKER_ERROR_STATUS: i32 = 125;
const DAEMON_ERROR_PREFIX: &str = "Error response from daemon:";

/// Split a `docker exec` result into the command's own outcome and errors
/// raised by docker before the command ran.
fn exec_outcome(result: CommandResult) -> Result<ExecOutput, DaemonError> {
    match result.exit_code {
        Some(0) => {}
        Some(DOCKER_ERROR_STATUS) => return Err(failure(&result)),
        _ if result.stderr.contains(DAEMON_ERROR_PREFIX) => return Err(failure(&result)),
        _ => {}
    }
    Ok(ExecOutput {
        exit_code: result.exit_code.unwrap_or(-1),
        output: result.output,
    })
}

/// `docker cp -` unpacks a tar from stdin at `dest`. The CLI always refuses
/// to replace an existing directory with a non-directory.
fn cp_args(container: &str, dest: &str) -> Vec<String> {
    vec!["cp".into(), "-".into(), format!("{container}:{dest}")]
}

/// Seconds of grace `docker stop` may use before the deadline passes.
fn stop_grace(deadline: Option<Instant>) -> u64 {
    let grace = match deadline {
        Some(d) => d.saturating_duration_since(Instant::now()).min(MAX_STOP_GRACE),
        None => MAX_STOP_GRACE,
    };
    grace.as_secs()
}

fn health_args(check: &HealthCheck) -> Vec<String> {
    let mut args = Vec::new();
    match check.test.split_first() {
        Some((kind, _)) if kind == "NONE" => {
            args.push("--no-healthcheck".into());
            return args;
        }
        Some((kind, rest)) if kind == "CMD-SHELL" => {
            args.extend(["--health-cmd".into(), rest.join(" ")]);
        }
        Some((kind, rest)) if kind == "CMD" => {
            args.extend(["--health-cmd".into(), shell_words::join(rest)]);
        }
        Some(_) => {
            args.extend(["--health-cmd".into(), shell_words::join(&check.test)]);
        }
        None => {}
    }
    if !check.interval.is_zero() {
        args.extend([
            "--health-interval".into(),
            format!("{}ms", check.interval.as_millis()),
        ]);
    }
    if !check.timeout.is_zero() {
        args.extend([
            "--health-timeout".into(),
            format!("{}ms", check.timeout.as_millis()),
        ]);
    }
    if check.retries > 0 {
        args.extend(["--health-retries".into(), check.retries.to_string()]);
    }
    args
}

/// Build the argument list for `docker create`.
///
/// The CLI only takes a single entrypoint word, so any further entrypoint
/// elements are passed ahead of the command, which is what the daemon does
/// with an entrypoint array anyway.
pub fn create_args(spec: &CreateSpec<'_>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "create".into(),
        "--name".into(),
        spec.name.into(),
        "--network".into(),
        spec.network.into(),
        "--restart".into(),
        "no".into(),
    ];

    for (key, value) in spec.labels {
        args.extend(["--label".into(), format!("{key}={value}")]);
    }
    for var in spec.env {
        args.extend(["--env".into(), var.clone()]);
    }
    for port in spec.ports {
        args.extend([
            "--publish".into(),
            format!(
                "{}:{}:{}/tcp",
                port.host_ip, port.host_port, port.container_port
            ),
        ]);
    }
    for mount in spec.mounts {
        let mut m = format!("type=bind,source={},target={}", mount.source, mount.target);
        if mount.read_only {
            m.push_str(",readonly");
        }
        args.extend(["--mount".into(), m]);
    }
    if let Some(check) = spec.health_check {
        args.extend(health_args(check));
    }

    let (entry, entry_rest) = match spec.entrypoint.split_first() {
        Some((first, rest)) => (Some(first), rest),
        None => (None, &[][..]),
    };
    if let Some(entry) = entry {
        args.extend(["--entrypoint".into(), entry.clone()]);
    }

    args.push(spec.image.into());
    args.extend(entry_rest.iter().cloned());
    args.extend(spec.command.iter().cloned());
    args
}

#[derive(Debug, Deserialize)]
struct HealthState {
    #[serde(rename = "Status", default)]
    status: String,
}

fn parse_health(raw: &str) -> Result<String, DaemonError> {
    let state: Option<HealthState> = serde_json::from_str(raw.trim())
        .map_err(|e| DaemonError::new(format!("unreadable health state {raw:?}: {e}")))?;
    Ok(state.map(|s| s.status).unwrap_or_default())
}

impl Daemon for DockerCli {
    fn network_inspect(&self, name: &str) -> Result<String, DaemonError> {
        self.check(self.command(vec![
            "network".into(),
            "inspect".into(),
            "--format".into(),
            "{{.Id}}".into(),
            name.into(),
        ]))
    }

    fn network_create(&self, name: &str) -> Result<String, DaemonError> {
        self.check(self.command(vec![
            "network".into(),
            "create".into(),
            "--driver".into(),
            "bridge".into(),
            "--scope".into(),
            "local".into(),
            "--attachable".into(),
            "--ipv6".into(),
            name.into(),
        ]))
    }

    fn image_inspect(&self, image: &str) -> Result<String, DaemonError> {
        self.check(self.command(vec![
            "image".into(),
            "inspect".into(),
            "--format".into(),
            "{{.Id}}".into(),
            image.into(),
        ]))
    }

    fn image_pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<(), DaemonError> {
        let result = self.invoke(
            self.command(vec!["pull".into(), image.into()]),
            |line| progress(line),
        )?;
        if !result.success {
            return Err(failure(&result));
        }
        Ok(())
    }

    fn container_create(&self, spec: &CreateSpec<'_>) -> Result<String, DaemonError> {
        self.check(self.command(create_args(spec)))
    }

    fn container_start(&self, container: &str) -> Result<(), DaemonError> {
        self.check(self.command(vec!["start".into(), container.into()]))
            .map(drop)
    }

    fn container_stop(
        &self,
        container: &str,
        deadline: Option<Instant>,
    ) -> Result<(), DaemonError> {
        let cmd = self
            .command(vec![
                "stop".into(),
                "--time".into(),
                stop_grace(deadline).to_string(),
                container.into(),
            ])
            .deadline(deadline);
        self.check(cmd).map(drop)
    }

    fn container_remove(
        &self,
        container: &str,
        deadline: Option<Instant>,
    ) -> Result<(), DaemonError> {
        let cmd = self
            .command(vec![
                "rm".into(),
                "--force".into(),
                "--volumes".into(),
                container.into(),
            ])
            .deadline(deadline);
        self.check(cmd).map(drop)
    }

    fn health_status(&self, container: &str) -> Result<String, DaemonError> {
        let raw = self.check(self.command(vec![
            "inspect".into(),
            "--type".into(),
            "container".into(),
            "--format".into(),
            "{{json .State.Health}}".into(),
            container.into(),
        ]))?;
        parse_health(&raw)
    }

    fn copy_archive(
        &self,
        container: &str,
        dest: &str,
        archive: &[u8],
    ) -> Result<(), DaemonError> {
        // Without --archive the CLI does not copy uid/gid from the tar
        // headers, so extracted files get the container's default owner.
        let cmd = self
            .command(cp_args(container, dest))
            .stdin(archive.to_vec());
        self.check(cmd).map(drop)
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, DaemonError> {
        let mut args = vec!["exec".into(), container.into()];
        args.extend(command.iter().cloned());
        exec_outcome(self.invoke(self.command(args), |_| {})?)
    }
}
