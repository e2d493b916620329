//! Completion barrier: expected-count counter plus a one-shot stopped flag.

use crate::errors::{Result, StagechainError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

#[derive(Debug, Default)]
struct BarrierState {
    expected: Option<usize>,
    admitted: usize,
    remaining: usize,
    stopped: bool,
}

/// Counts down the tasks of one executor run and releases waiters at zero.
///
/// The count is set once. Every push reserves a slot with [`admit`], and every
/// executed task calls [`task_finished`] exactly once, whether it succeeded
/// or not.
///
/// [`admit`]: CompletionBarrier::admit
/// [`task_finished`]: CompletionBarrier::task_finished
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    state: Mutex<BarrierState>,
    drained: Condvar,
}

impl CompletionBarrier {
    /// Creates an unarmed barrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the barrier with the number of tasks to expect.
    ///
    /// Returns `true` if the barrier drained immediately (`n == 0`).
    pub fn set_task_count(&self, n: usize) -> Result<bool> {
        let mut state = self.state.lock();
        if let Some(expected) = state.expected {
            return Err(StagechainError::TaskCountAlreadySet { expected });
        }
        state.expected = Some(n);
        state.remaining = n;
        debug!(expected = n, "Completion barrier armed");

        if n > 0 {
            return Ok(false);
        }
        state.stopped = true;
        drop(state);
        self.drained.notify_all();
        Ok(true)
    }

    /// Reserves one expected slot for a task about to be pushed.
    pub fn admit(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(StagechainError::Drained);
        }
        let Some(expected) = state.expected else {
            return Err(StagechainError::TaskCountNotSet);
        };
        if state.admitted >= expected {
            return Err(StagechainError::TooManyTasks { expected });
        }
        state.admitted += 1;
        Ok(())
    }

    /// Records one executed task.
    ///
    /// Returns `true` exactly once: for the call that brings the count to
    /// zero, after every waiter has been notified.
    pub fn task_finished(&self) -> bool {
        let mut state = self.state.lock();
        if state.stopped || state.remaining == 0 {
            error!(
                admitted = state.admitted,
                "Task finished on a barrier that has no remaining tasks"
            );
            return false;
        }
        state.remaining -= 1;
        if state.remaining > 0 {
            return false;
        }
        state.stopped = true;
        drop(state);
        self.drained.notify_all();
        true
    }

    /// Blocks until the barrier has drained.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.stopped {
            self.drained.wait(&mut state);
        }
    }

    /// Remaining tasks, or `None` before the count is set.
    pub fn remaining(&self) -> Option<usize> {
        let state = self.state.lock();
        state.expected.map(|_| state.remaining)
    }

    /// Whether the barrier has drained.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}
