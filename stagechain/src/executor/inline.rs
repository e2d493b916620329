//! Caller-thread executor.

use super::{Executor, ExecutorCore, ExecutorStats, Task};
use crate::config::ExecutionMode;
use crate::errors::{Result, StagechainError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;

/// Runs the consumer loop only when a caller invokes [`Executor::run`].
///
/// No thread is ever spawned: the caller's thread becomes the sole consumer
/// for the duration of `run()`. This is the executor for work bound to a
/// specific thread of control (a rendering context, a UI loop, a
/// thread-affine handle). Pushes made before `run()` queue up to the
/// configured capacity and then block.
pub struct InlineExecutor {
    core: ExecutorCore,
    running: AtomicBool,
}

impl InlineExecutor {
    /// Creates an inline executor over a queue of `capacity` slots.
    pub fn new(label: impl Into<String>, capacity: usize) -> Result<Self> {
        Ok(Self {
            core: ExecutorCore::new(label.into(), capacity)?,
            running: AtomicBool::new(false),
        })
    }

    /// Whether a thread is currently inside `run()`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Executor for InlineExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }

    fn set_task_count(&self, n: usize) -> Result<()> {
        self.core.set_task_count(n)
    }

    fn push_task(&self, task: Task) -> Result<()> {
        self.core.push(task)
    }

    fn wait(&self) {
        self.core.wait();
    }

    fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(StagechainError::AlreadyRunning(
                self.core.label().to_string(),
            ));
        }

        let current = thread::current();
        debug!(
            executor = %self.core.label(),
            thread = current.name().unwrap_or("<unnamed>"),
            "Inline consumer loop started"
        );
        let executed = self.core.consume();
        debug!(executor = %self.core.label(), executed, "Inline consumer loop finished");

        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn shutdown(&self) {
        self.core.shutdown();
    }

    fn stats(&self) -> ExecutorStats {
        self.core.stats(ExecutionMode::Inline)
    }
}

impl Drop for InlineExecutor {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl fmt::Debug for InlineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineExecutor")
            .field("label", &self.core.label())
            .field("running", &self.is_running())
            .field("core", &self.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_run_executes_on_calling_thread() {
        let executor = Arc::new(InlineExecutor::new("inline", 2).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        executor.set_task_count(6).unwrap();

        let producer = {
            let executor = Arc::clone(&executor);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                for i in 0..6 {
                    let seen = Arc::clone(&seen);
                    executor
                        .push_task(Box::new(move || {
                            seen.lock().push((i, thread::current().id()));
                        }))
                        .unwrap();
                }
            })
        };

        executor.run().unwrap();
        producer.join().unwrap();

        let me = thread::current().id();
        let seen = seen.lock();
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|(_, id)| *id == me));
        assert_eq!(
            seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            (0..6).collect::<Vec<_>>()
        );
        assert_eq!(executor.stats().remaining, Some(0));
    }

    #[test]
    fn test_push_before_run_is_buffered() {
        let executor = InlineExecutor::new("inline", 4).unwrap();
        executor.set_task_count(3).unwrap();
        for _ in 0..3 {
            executor.push_task(Box::new(|| {})).unwrap();
        }
        assert_eq!(executor.stats().queue_len, 3);

        executor.run().unwrap();
        assert!(executor.stats().drained);
        assert!(!executor.is_running());
    }

    #[test]
    fn test_run_after_drain_returns_immediately() {
        let executor = InlineExecutor::new("inline", 1).unwrap();
        executor.set_task_count(0).unwrap();
        executor.run().unwrap();
        executor.run().unwrap();
    }

    #[test]
    fn test_concurrent_run_rejected() {
        let executor = Arc::new(InlineExecutor::new("inline", 1).unwrap());
        executor.set_task_count(1).unwrap();

        let runner = {
            let executor = Arc::clone(&executor);
            thread::spawn(move || executor.run())
        };
        while !executor.is_running() {
            thread::yield_now();
        }

        assert!(matches!(
            executor.run(),
            Err(StagechainError::AlreadyRunning(name)) if name == "inline"
        ));

        executor.push_task(Box::new(|| {})).unwrap();
        runner.join().unwrap().unwrap();
    }
}
