//! Worker-pool executor.

use super::{Executor, ExecutorCore, ExecutorStats, Task};
use crate::config::ExecutionMode;
use crate::errors::{Result, StagechainError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Runs the consumer loop on a fixed number of background threads.
///
/// Workers exit only when the queue is closed, which happens once the
/// completion barrier drains or the executor is shut down. Dropping the
/// executor shuts it down and joins every worker.
pub struct PooledExecutor {
    core: Arc<ExecutorCore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl PooledExecutor {
    /// Spawns `workers` consumer threads over a queue of `capacity` slots.
    ///
    /// Threads are named `<label>-worker-<n>`.
    pub fn new(label: impl Into<String>, workers: usize, capacity: usize) -> Result<Self> {
        if workers == 0 {
            return Err(StagechainError::InvalidWorkerCount(workers));
        }
        let core = Arc::new(ExecutorCore::new(label.into(), capacity)?);

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let thread_name = format!("{}-worker-{id}", core.label());
            let worker_core = Arc::clone(&core);
            let spawned = thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker_loop(&worker_core, id));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    core.shutdown();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(StagechainError::WorkerSpawn(err));
                }
            }
        }

        Ok(Self {
            core,
            workers: Mutex::new(handles),
            worker_count: workers,
        })
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

fn worker_loop(core: &ExecutorCore, id: usize) {
    debug!(executor = %core.label(), worker = id, "Worker started");
    let executed = core.consume();
    debug!(executor = %core.label(), worker = id, executed, "Worker exiting");
}

impl Executor for PooledExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Pooled {
            workers: self.worker_count,
        }
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
        Err(StagechainError::NotInline(self.core.label().to_string()))
    }

    fn shutdown(&self) {
        if self.core.shutdown() {
            debug!(executor = %self.core.label(), "Worker pool shut down");
        }
    }

    fn stats(&self) -> ExecutorStats {
        self.core.stats(self.mode())
    }
}

impl Drop for PooledExecutor {
    fn drop(&mut self) {
        self.shutdown();
        let current = thread::current().id();
        for handle in self.workers.get_mut().drain(..) {
            // The last stage handle can be released by one of our own tasks.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(executor = %self.core.label(), "Worker thread panicked");
            }
        }
    }
}

impl fmt::Debug for PooledExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledExecutor")
            .field("label", &self.core.label())
            .field("workers", &self.worker_count)
            .field("core", &self.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_rejected() {
        let result = PooledExecutor::new("pool", 0, 4);
        assert!(matches!(result, Err(StagechainError::InvalidWorkerCount(0))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = PooledExecutor::new("pool", 2, 0);
        assert!(matches!(result, Err(StagechainError::InvalidCapacity(0))));
    }

    #[test]
    fn test_runs_all_tasks_on_workers() {
        let pool = PooledExecutor::new("pool", 3, 2).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let threads = Arc::new(Mutex::new(HashSet::new()));

        pool.set_task_count(50).unwrap();
        for _ in 0..50 {
            let hits = Arc::clone(&hits);
            let threads = Arc::clone(&threads);
            pool.push_task(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                let name = thread::current().name().map(str::to_string);
                threads.lock().insert(name);
            }))
            .unwrap();
        }
        pool.wait();

        assert_eq!(hits.load(Ordering::SeqCst), 50);
        let stats = pool.stats();
        assert_eq!(stats.remaining, Some(0));
        assert_eq!(stats.completed, 50);
        assert!(stats.drained);
        assert!(threads
            .lock()
            .iter()
            .all(|name| name.as_deref().is_some_and(|n| n.starts_with("pool-worker-"))));
    }

    #[test]
    fn test_run_is_not_supported() {
        let pool = PooledExecutor::new("pool", 1, 1).unwrap();
        assert!(matches!(pool.run(), Err(StagechainError::NotInline(name)) if name == "pool"));
        pool.set_task_count(0).unwrap();
    }

    #[test]
    fn test_drop_without_work_joins_workers() {
        let pool = PooledExecutor::new("idle", 4, 4).unwrap();
        assert_eq!(pool.worker_count(), 4);
        drop(pool);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = PooledExecutor::new("pool", 2, 2).unwrap();
        pool.shutdown();
        pool.shutdown();
        pool.set_task_count(1).unwrap();
        assert!(matches!(
            pool.push_task(Box::new(|| {})),
            Err(StagechainError::QueueClosed)
        ));
    }
}
