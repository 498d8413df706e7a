use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::docker::CancelToken;

use super::descriptor::{Descriptor, LifecycleState};
use super::error::StackError;

/// Progress reported by a run as it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Transition {
        index: usize,
        name: String,
        state: LifecycleState,
    },
    Finished,
}

/// The first fatal error of a run. Later errors never replace it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Cause(Arc<Mutex<Option<Arc<StackError>>>>);

impl Cause {
    /// Record `err` unless a cause is already set. Returns whether it was.
    pub(crate) fn set_first(&self, err: StackError) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(Arc::new(err));
        true
    }

    pub(crate) fn get(&self) -> Option<Arc<StackError>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// One orchestration attempt running in the background.
///
/// Dropping the handle does not stop the run; call [`RunHandle::cancel`]
/// and then [`RunHandle::wait`] to get the descriptors back for teardown.
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) cancel: CancelToken,
    pub(crate) cause: Cause,
    pub(crate) events: Receiver<RunEvent>,
    pub(crate) thread: JoinHandle<Vec<Descriptor>>,
}

impl RunHandle {
    /// Ask the run to stop before its next descriptor (or during a health
    /// backoff). Steps already under way finish first.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel_with(reason);
    }

    /// The first fatal error, or the interruption, if any so far.
    pub fn cause(&self) -> Option<Arc<StackError>> {
        self.cause.get()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Drain events without blocking.
    pub fn try_events(&self) -> Vec<RunEvent> {
        self.events.try_iter().collect()
    }

    /// Block until the run ends and hand the descriptors back.
    pub fn wait(self) -> RunOutcome {
        let descriptors = match self.thread.join() {
            Ok(descriptors) => descriptors,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        RunOutcome {
            descriptors,
            cause: self.cause.get(),
        }
    }
}

/// A finished run: the descriptors with their runtime state, and why the
/// run stopped early, if it did.
#[derive(Debug)]
pub struct RunOutcome {
    pub descriptors: Vec<Descriptor>,
    pub cause: Option<Arc<StackError>>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.cause.is_none()
    }

    pub fn was_interrupted(&self) -> bool {
        self.cause.as_ref().is_some_and(|c| c.is_interrupted())
    }
}
