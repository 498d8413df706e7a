use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Cooperative cancellation token backed by an `AtomicBool`.
///
/// Tokens form a tree: a token made with [`CancelToken::child`] reports
/// cancelled once it or any ancestor is cancelled, while cancelling the
/// child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    reason: Mutex<Option<String>>,
    parent: Option<CancelToken>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled with `self` but can also be cancelled alone.
    pub fn child(&self) -> Self {
        Self(Arc::new(Inner {
            parent: Some(self.clone()),
            ..Inner::default()
        }))
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel_with("cancelled");
    }

    /// Signal cancellation with a reason. The first reason sticks.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.0.reason.lock()
            && slot.is_none()
        {
            *slot = Some(reason.into());
        }
        self.0.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::Acquire)
            || self.0.parent.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Why the token was cancelled, looking through to the nearest
    /// cancelled ancestor. `None` while not cancelled.
    pub fn reason(&self) -> Option<String> {
        if self.0.flag.load(Ordering::Acquire) {
            return self.0.reason.lock().ok().and_then(|r| r.clone());
        }
        self.0.parent.as_ref().and_then(CancelToken::reason)
    }

    /// Sleep for `timeout` unless cancelled first.
    ///
    /// Returns `true` if the token was cancelled before the time was up.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let end = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= end {
                return false;
            }
            std::thread::sleep(WAIT_SLICE.min(end - now));
        }
    }
}

/// Host side of a published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// A bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Health check forwarded to the daemon at creation time.
///
/// `test` follows the daemon's convention: `["CMD", arg..]`,
/// `["CMD-SHELL", script]` or `["NONE"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

impl HealthCheck {
    /// A `["NONE"]` test turns the image's own check off; there is nothing
    /// to wait on.
    pub fn is_disabled(&self) -> bool {
        self.test.first().is_some_and(|kind| kind == "NONE")
    }
}

/// Everything the daemon needs to create one container.
#[derive(Debug, Clone, Copy)]
pub struct CreateSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub network: &'a str,
    pub labels: &'a [(String, String)],
    pub env: &'a [String],
    pub ports: &'a [PortBinding],
    pub mounts: &'a [Mount],
    pub entrypoint: &'a [String],
    pub command: &'a [String],
    pub health_check: Option<&'a HealthCheck>,
}

/// Outcome of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    /// Interleaved stdout and stderr.
    pub output: String,
}
