use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use stackup::config::{self, Config};
use stackup::docker::{self, CancelToken, DockerCli};
use stackup::shutdown;
use stackup::stack::{Orchestrator, RunEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Bring up the services in a stackup.yaml, keep them running until
/// interrupted, then tear them down.
#[derive(Debug, Parser)]
#[command(name = "stackup", version, about)]
struct Cli {
    /// Config file (default: stackup.yaml in the current directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep containers running after a failed run until interrupted
    #[arg(long)]
    keep_alive: bool,

    /// Log every lifecycle step
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("stackup=debug")
        } else {
            EnvFilter::new("stackup=info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir()?;
    let path = config::resolve(cli.config.as_deref(), &cwd);
    let config = Config::load(&path)?;
    let keep_alive = cli.keep_alive || config.keep_alive;
    let descriptors = config.descriptors()?;

    let version = docker::ensure_available(&config.docker_bin)?;
    debug!(%version, "docker daemon is available");
    shutdown::install()?;

    let orchestrator = Orchestrator::new(
        Arc::new(DockerCli::new(&config.docker_bin)),
        config.settings(),
    );
    let signal = CancelToken::new();
    info!(
        project = %config.project,
        services = descriptors.len(),
        "starting stack"
    );
    let handle = orchestrator.run(descriptors, &signal);

    let mut settled = false;
    loop {
        for event in handle.try_events() {
            if let RunEvent::Transition { index, name, state } = event {
                debug!(index, %name, state = state.as_str(), "container transition");
            }
        }

        if let Some(sig) = shutdown::requested() {
            info!(signal = sig, "shutting down");
            signal.cancel_with(format!("received {sig}"));
            break;
        }

        if !settled && handle.is_finished() {
            settled = true;
            match handle.cause() {
                None => info!("stack is up; press ctrl-c to stop"),
                Some(cause) if cause.is_interrupted() => break,
                Some(_) if keep_alive => {
                    warn!("stack failed; keeping containers until interrupted")
                }
                Some(_) => break,
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    let outcome = handle.wait();
    let failed = outcome.cause.as_ref().filter(|c| !c.is_interrupted()).cloned();
    let mut descriptors = outcome.descriptors;

    let deadline = Instant::now() + config.shutdown_timeout();
    let errors = orchestrator.teardown(&mut descriptors, deadline);
    if errors.is_empty() {
        info!("stack torn down");
    } else {
        warn!(errors = errors.len(), "teardown finished with errors");
    }

    match failed {
        Some(cause) => {
            error!("stack failed: {cause}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
