//! Executors consume a stage's work queue.
//!
//! Both variants own one [`BoundedQueue`] and one [`CompletionBarrier`] and
//! share the same consumer loop. They differ only in who runs that loop:
//!
//! - [`PooledExecutor`] runs it on N background worker threads.
//! - [`InlineExecutor`] runs it on whichever thread calls [`Executor::run`].

mod barrier;
mod inline;
mod pooled;

pub use barrier::CompletionBarrier;
pub use inline::InlineExecutor;
pub use pooled::PooledExecutor;

use crate::config::ExecutionMode;
use crate::errors::{panic_message, Result, StagechainError};
use crate::queue::BoundedQueue;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, trace};

/// A unit of queued work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The capability shared by pooled and inline executors.
pub trait Executor: Send + Sync + Debug {
    /// How this executor consumes its queue.
    fn mode(&self) -> ExecutionMode;

    /// Arms the completion barrier. Must precede the matching pushes.
    fn set_task_count(&self, n: usize) -> Result<()>;

    /// Enqueues a task, blocking while the queue is full.
    fn push_task(&self, task: Task) -> Result<()>;

    /// Blocks until every expected task has finished.
    fn wait(&self);

    /// Runs the consumer loop on the calling thread until drained.
    fn run(&self) -> Result<()>;

    /// Closes the queue. Idempotent.
    fn shutdown(&self);

    /// Snapshot of queue and barrier state.
    fn stats(&self) -> ExecutorStats;
}

/// Point-in-time view of an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Consumption model.
    pub mode: ExecutionMode,
    /// Items currently queued.
    pub queue_len: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Pushes that waited for a free slot.
    pub blocked_pushes: u64,
    /// Tasks still expected, or `None` before the count is set.
    pub remaining: Option<usize>,
    /// Tasks executed so far.
    pub completed: u64,
    /// Whether the barrier has drained.
    pub drained: bool,
}

/// Queue, barrier and consumer loop shared by both executor variants.
#[derive(Debug)]
pub(crate) struct ExecutorCore {
    label: String,
    queue: BoundedQueue<Task>,
    barrier: CompletionBarrier,
    completed: AtomicU64,
}

impl ExecutorCore {
    pub(crate) fn new(label: String, capacity: usize) -> Result<Self> {
        Ok(Self {
            label,
            queue: BoundedQueue::new(capacity)?,
            barrier: CompletionBarrier::new(),
            completed: AtomicU64::new(0),
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_task_count(&self, n: usize) -> Result<()> {
        if self.barrier.set_task_count(n)? {
            info!(executor = %self.label, "Executor drained with no tasks");
            self.queue.close();
        }
        Ok(())
    }

    pub(crate) fn push(&self, task: Task) -> Result<()> {
        self.barrier.admit()?;
        self.queue
            .push(task)
            .map_err(|_| StagechainError::QueueClosed)
    }

    pub(crate) fn wait(&self) {
        self.barrier.wait();
    }

    pub(crate) fn shutdown(&self) -> bool {
        self.queue.close()
    }

    /// Pops and runs tasks until the queue is closed.
    ///
    /// Returns the number of tasks this consumer executed.
    pub(crate) fn consume(&self) -> u64 {
        let mut executed = 0;
        while let Some(task) = self.queue.pop() {
            let _finish = FinishGuard(self);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(
                    executor = %self.label,
                    panic = %panic_message(&*payload),
                    "Task panicked outside its stage boundary"
                );
            }
            executed += 1;
        }
        executed
    }

    fn finish_one(&self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(executor = %self.label, completed, "Task finished");
        if self.barrier.task_finished() {
            info!(executor = %self.label, completed, "Executor drained");
            self.queue.close();
        }
    }

    pub(crate) fn stats(&self, mode: ExecutionMode) -> ExecutorStats {
        ExecutorStats {
            mode,
            queue_len: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            blocked_pushes: self.queue.blocked_pushes(),
            remaining: self.barrier.remaining(),
            completed: self.completed.load(Ordering::Relaxed),
            drained: self.barrier.is_stopped(),
        }
    }
}

/// Calls `task_finished` when a task ends, however it ends.
struct FinishGuard<'a>(&'a ExecutorCore);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_one();
    }
}
