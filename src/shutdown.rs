//! SIGINT/SIGTERM detection for the foreground process.
//!
//! The handler only records the signal number; the main loop polls
//! [`requested`] and turns it into a cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};

static RECEIVED: LazyLock<Arc<AtomicUsize>> = LazyLock::new(|| Arc::new(AtomicUsize::new(0)));

/// Route SIGINT and SIGTERM to [`requested`] instead of killing the process.
pub fn install() -> Result<()> {
    for signum in [SIGINT, SIGTERM] {
        signal_hook::flag::register_usize(signum, Arc::clone(&RECEIVED), signum as usize)
            .with_context(|| format!("could not install handler for {}", signal_name(signum)))?;
    }
    Ok(())
}

/// The signal that asked us to stop, if any has arrived.
pub fn requested() -> Option<&'static str> {
    match RECEIVED.load(Ordering::SeqCst) {
        0 => None,
        signum => Some(signal_name(signum as i32)),
    }
}

fn signal_name(signum: i32) -> &'static str {
    match signum {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        _ => "signal",
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn names_known_signals() {
        assert_eq!(signal_name(SIGINT), "SIGINT");
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(signal_hook::consts::SIGUSR1), "signal");
    }

    #[test]
    fn raised_sigterm_is_recorded_not_fatal() {
        install().unwrap();
        signal_hook::low_level::raise(SIGTERM).unwrap();
        assert_eq!(requested(), Some("SIGTERM"));
    }
}
