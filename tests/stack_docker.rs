//! Integration tests against a real Docker daemon.
//!
//! These require a running Docker daemon and are marked `#[ignore]`.
//! Run with: `cargo test -- --ignored`

use std::sync::Arc;
use std::time::{Duration, Instant};

use stackup::docker::{CancelToken, Daemon, DockerCli, HealthCheck};
use stackup::stack::{Descriptor, LifecycleState, Orchestrator, Settings};

const IMAGE: &str = "alpine:3.20";

/// Unique per test and process so parallel runs don't collide.
fn name(test: &str) -> String {
    format!("stackup-it-{test}-{}", std::process::id())
}

/// An alpine container that stays up and exits promptly on SIGTERM.
fn idle(name: &str) -> Descriptor {
    Descriptor::new(name, IMAGE).command(["sh", "-c", "trap 'exit 0' TERM; sleep 300 & wait"])
}

fn orchestrator(network: &str) -> Orchestrator {
    Orchestrator::new(
        Arc::new(DockerCli::default()),
        Settings::new("stackup-it", network),
    )
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

#[test]
#[ignore]
fn embedded_file_is_readable_from_hook() {
    let n = name("embed");
    let orch = orchestrator(&n);
    let d = idle(&n)
        .embed("/etc/stackup/greeting.txt", "hello from stackup")
        .after_start(|orch, d| {
            let out = orch.exec(d.id(), &["cat", "/etc/stackup/greeting.txt"])?;
            assert_eq!(out, "hello from stackup");
            Ok(out)
        });

    let mut outcome = orch.run(vec![d], &CancelToken::new()).wait();
    let errors = orch.teardown(&mut outcome.descriptors, deadline());

    assert!(outcome.is_success(), "run failed: {:?}", outcome.cause);
    assert!(errors.is_empty(), "teardown failed: {errors:?}");
    assert_eq!(outcome.descriptors[0].state(), LifecycleState::Removed);
}

#[test]
#[ignore]
fn health_check_gates_until_healthy() {
    let n = name("health");
    let orch = orchestrator(&n);
    let d = idle(&n).health_check(HealthCheck {
        test: vec!["CMD".into(), "true".into()],
        interval: Duration::from_secs(1),
        timeout: Duration::from_secs(1),
        retries: 3,
    });

    let mut outcome = orch.run(vec![d], &CancelToken::new()).wait();
    let errors = orch.teardown(&mut outcome.descriptors, deadline());

    assert!(outcome.is_success(), "run failed: {:?}", outcome.cause);
    assert!(errors.is_empty(), "teardown failed: {errors:?}");
}

#[test]
#[ignore]
fn failing_hook_surfaces_exec_output() {
    let n = name("hook");
    let orch = orchestrator(&n);
    let d = idle(&n).after_start(|orch, d| orch.exec(d.id(), &["sh", "-c", "echo boom; exit 3"]));

    let mut outcome = orch.run(vec![d], &CancelToken::new()).wait();
    let errors = orch.teardown(&mut outcome.descriptors, deadline());

    let cause = outcome.cause.expect("hook failure should be the cause");
    assert_eq!(cause.output(), Some("boom\n"));
    assert!(errors.is_empty(), "teardown failed: {errors:?}");
}

#[test]
#[ignore]
fn stale_container_with_same_name_is_replaced() {
    let n = name("conflict");
    let orch = orchestrator(&n);
    let docker = DockerCli::default();

    // Leave a container behind under the name the run will use.
    let first = orch.run(vec![idle(&n)], &CancelToken::new()).wait();
    assert!(first.is_success(), "first run failed: {:?}", first.cause);
    let stale_id = first.descriptors[0].created_id().map(str::to_string);

    let mut outcome = orch.run(vec![idle(&n)], &CancelToken::new()).wait();
    let errors = orch.teardown(&mut outcome.descriptors, deadline());

    assert!(outcome.is_success(), "run failed: {:?}", outcome.cause);
    assert_ne!(outcome.descriptors[0].created_id().map(str::to_string), stale_id);
    assert!(errors.is_empty(), "teardown failed: {errors:?}");
    assert!(docker.health_status(&n).is_err(), "container should be gone");
}

#[test]
#[ignore]
fn file_over_existing_directory_is_refused() {
    let n = name("overwrite");
    let orch = orchestrator(&n);
    // /etc/apk is a directory in alpine; `docker cp` will not replace it.
    let d = idle(&n).embed("/etc/apk", "not a directory");

    let mut outcome = orch.run(vec![d], &CancelToken::new()).wait();
    let errors = orch.teardown(&mut outcome.descriptors, deadline());

    let cause = outcome.cause.expect("injection should fail");
    assert!(
        cause.to_string().contains("failed to create file 0 (/etc/apk)"),
        "unexpected cause: {cause}"
    );
    assert!(!outcome.descriptors[0].is_started());
    assert!(errors.is_empty(), "teardown failed: {errors:?}");
}

#[test]
#[ignore]
fn exec_in_missing_container_is_a_daemon_error() {
    let docker = DockerCli::default();
    let err = docker
        .exec(&name("no-such"), &["true".to_string()])
        .expect_err("docker should refuse to exec");
    assert!(err.to_string().contains("No such container"), "{err}");
}
