use std::time::Duration;

use tracing::debug;

use crate::docker::{CancelToken, HealthCheck};

use super::descriptor::{Descriptor, LifecycleState};
use super::error::{Result, StackError};
use super::orchestrator::Orchestrator;

const HEALTHY: &str = "healthy";
const UNHEALTHY: &str = "unhealthy";

/// How long to wait for a container to report healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Polls before giving up.
    pub retries: u32,
    /// Delay before the second poll; each later delay doubles.
    pub backoff_base: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl HealthPolicy {
    /// Delay after the poll numbered `attempt` (zero-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Sleeps between health polls.
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`; returns `true` if `cancel` fired first.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Real-time sleeper that wakes early on cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancellableSleep;

impl Sleeper for CancellableSleep {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait_timeout(duration)
    }
}

impl Orchestrator {
    /// Block until the descriptor's container reports healthy.
    ///
    /// Descriptors without a health check (or with a disabled one) pass at
    /// once, without a daemon call. `unhealthy` is final; any other status
    /// costs one retry.
    pub fn await_healthy(&self, descriptor: &mut Descriptor, cancel: &CancelToken) -> Result<()> {
        if descriptor
            .health_check
            .as_ref()
            .is_none_or(HealthCheck::is_disabled)
        {
            descriptor.state = LifecycleState::Healthy;
            return Ok(());
        }
        descriptor.state = LifecycleState::HealthPending;

        let policy = self.settings.health;
        let mut last_status = String::new();
        for attempt in 0..policy.retries {
            if attempt > 0 {
                let delay = policy.backoff(attempt - 1);
                if self.sleeper.sleep(delay, cancel) {
                    return Err(StackError::Interrupted {
                        reason: cancel
                            .reason()
                            .unwrap_or_else(|| "cancelled".to_string()),
                    });
                }
            }

            let status = self
                .daemon
                .health_status(descriptor.id())
                .map_err(|source| StackError::Inspect {
                    name: descriptor.name.clone(),
                    source,
                })?;

            match status.as_str() {
                HEALTHY => {
                    debug!(name = %descriptor.name, "container is healthy");
                    descriptor.state = LifecycleState::Healthy;
                    return Ok(());
                }
                UNHEALTHY => {
                    descriptor.state = LifecycleState::Unhealthy;
                    return Err(StackError::Unhealthy {
                        name: descriptor.name.clone(),
                    });
                }
                _ => {
                    debug!(
                        name = %descriptor.name,
                        image = %descriptor.image,
                        status = %status,
                        attempt,
                        "container is not healthy yet"
                    );
                    last_status = status;
                }
            }
        }

        descriptor.state = LifecycleState::Unhealthy;
        Err(StackError::NotHealthy {
            name: descriptor.name.clone(),
            attempts: policy.retries,
            last_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::DaemonError;
    use crate::stack::testing::{Call, FakeDaemon};

    fn checked(name: &str) -> Descriptor {
        let mut d = Descriptor::new(name, "postgres:17").health_check(HealthCheck {
            test: vec!["CMD".into(), "pg_isready".into()],
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            retries: 10,
        });
        d.created_id = Some(format!("id-{name}"));
        d.started = true;
        d
    }

    fn health_polls(fake: &FakeDaemon) -> usize {
        fake.calls()
            .iter()
            .filter(|c| matches!(c, Call::Health(_)))
            .count()
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = HealthPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn no_health_check_means_healthy_without_daemon_calls() {
        let fake = FakeDaemon::new();
        let orch = fake.orchestrator();
        let mut d = Descriptor::new("kong", "kong:3.9.1");
        orch.await_healthy(&mut d, &CancelToken::new()).unwrap();
        assert_eq!(d.state(), LifecycleState::Healthy);
        assert!(fake.calls().is_empty());
        assert!(fake.sleeps().is_empty());
    }

    #[test]
    fn disabled_health_check_is_not_gated() {
        let fake = FakeDaemon::new();
        fake.script_health([""]);
        let orch = fake.orchestrator();
        let mut d = checked("web");
        if let Some(check) = d.health_check.as_mut() {
            check.test = vec!["NONE".into()];
        }
        orch.await_healthy(&mut d, &CancelToken::new()).unwrap();
        assert_eq!(d.state(), LifecycleState::Healthy);
        assert_eq!(health_polls(&fake), 0);
        assert!(fake.sleeps().is_empty());
    }

    #[test]
    fn unhealthy_fails_immediately_without_sleeping() {
        let fake = FakeDaemon::new();
        fake.script_health(["unhealthy", "healthy"]);
        let orch = fake.orchestrator();
        let mut d = checked("db");
        let err = orch.await_healthy(&mut d, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, StackError::Unhealthy { .. }));
        assert_eq!(health_polls(&fake), 1);
        assert!(fake.sleeps().is_empty());
        assert_eq!(d.state(), LifecycleState::Unhealthy);
    }

    #[test]
    fn starting_four_times_then_healthy_takes_five_polls() {
        let fake = FakeDaemon::new();
        fake.script_health(["starting", "starting", "starting", "starting", "healthy"]);
        let orch = fake.orchestrator();
        let mut d = checked("db");
        orch.await_healthy(&mut d, &CancelToken::new()).unwrap();
        assert_eq!(health_polls(&fake), 5);
        let sleeps = fake.sleeps();
        assert_eq!(sleeps.len(), 4);
        assert!(sleeps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sleeps[0], Duration::from_secs(1));
        assert_eq!(sleeps[3], Duration::from_secs(8));
        assert_eq!(d.state(), LifecycleState::Healthy);
    }

    #[test]
    fn exhausting_retries_is_fatal() {
        let fake = FakeDaemon::new();
        fake.script_health(["starting"; 6]);
        let orch = fake.orchestrator();
        let mut d = checked("db");
        let err = orch.await_healthy(&mut d, &CancelToken::new()).unwrap_err();
        match err {
            StackError::NotHealthy {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_status, "starting");
            }
            other => panic!("expected NotHealthy, got {other}"),
        }
        assert_eq!(health_polls(&fake), 5);
    }

    #[test]
    fn inspect_error_aborts_at_once() {
        let fake = FakeDaemon::new();
        fake.script_health_results(vec![Err(DaemonError::new("Error: No such container: db"))]);
        let orch = fake.orchestrator();
        let mut d = checked("db");
        let err = orch.await_healthy(&mut d, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, StackError::Inspect { .. }));
        assert_eq!(health_polls(&fake), 1);
        assert!(fake.sleeps().is_empty());
    }

    #[test]
    fn cancelled_sleep_interrupts_the_gate() {
        let fake = FakeDaemon::new();
        fake.script_health(["starting", "healthy"]);
        let orch = fake.orchestrator();
        let mut d = checked("db");
        let cancel = CancelToken::new();
        cancel.cancel_with("shutdown requested");
        let err = orch.await_healthy(&mut d, &cancel).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(err.to_string(), "interrupted: shutdown requested");
        assert_eq!(health_polls(&fake), 1);
    }

    #[test]
    fn cancellable_sleep_wakes_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(CancellableSleep.sleep(Duration::from_secs(30), &cancel));
    }
}
