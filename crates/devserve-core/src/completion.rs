use std::fmt;
use std::sync::{Arc, Mutex};

/// Final outcome reported through a completion signal.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Readiness was observed: the delay elapsed or the output pattern
    /// matched.
    Ready,
    /// The child exited; its status is passed through untouched.
    Exited(std::process::ExitStatus),
    /// The child could not be launched.
    SpawnFailed(String),
    /// The configured fallback result, reported when the command is
    /// missing.
    Fallback(String),
    /// An explicit stop ended the cycle.
    Stopped,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            TaskOutcome::Ready | TaskOutcome::Fallback(_) | TaskOutcome::Stopped => true,
            TaskOutcome::Exited(status) => status.success(),
            TaskOutcome::SpawnFailed(_) => false,
        }
    }
}

type DoneFn = Box<dyn FnOnce(TaskOutcome) + Send>;

/// One-shot completion signal obtained from the caller at the start of a
/// cycle.
///
/// Any number of clones may race to fire it (delay timer, output match,
/// exit waiter, explicit stop); the first trigger wins and the callback is
/// dropped, so every later trigger is a no-op.
#[derive(Clone)]
pub struct CompletionSignal {
    inner: Arc<Mutex<Option<DoneFn>>>,
}

impl CompletionSignal {
    pub fn new(done: impl FnOnce(TaskOutcome) + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(done)))),
        }
    }

    /// Fire the signal. Returns true when this call actually delivered the
    /// outcome, false when the signal had already fired.
    pub fn fire(&self, outcome: TaskOutcome) -> bool {
        let callback = self.inner.lock().unwrap().take();
        match callback {
            Some(done) => {
                done(outcome);
                true
            }
            None => false,
        }
    }

    /// Check whether the signal has already fired.
    pub fn is_spent(&self) -> bool {
        self.inner.lock().unwrap().is_none()
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("spent", &self.is_spent())
            .finish()
    }
}
