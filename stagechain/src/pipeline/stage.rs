//! Stages and stage chaining.

use super::registry::{FailureRecord, PipelineRegistry};
use crate::config::{ExecutionMode, StageConfig};
use crate::errors::{Result, StagechainError, TaskError, TaskResult};
use crate::executor::{Executor, ExecutorStats, InlineExecutor, PooledExecutor};
use crate::observability::SpanTimer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// The user function a stage runs for each work index.
pub type StageFn = dyn Fn(usize) -> TaskResult + Send + Sync;

struct StageInner {
    name: String,
    executor: Box<dyn Executor>,
    function: Box<StageFn>,
    next: RwLock<Option<Stage>>,
    registry: RwLock<Arc<PipelineRegistry>>,
}

/// A named processing step: an executor, a user function and an optional
/// link to the next stage.
///
/// `Stage` is a handle; clones refer to the same stage, so a producer thread
/// can hold one while another thread waits on it. Every index pushed is
/// passed to the function exactly once and then forwarded to the next stage,
/// whether the function succeeded, failed or panicked.
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

/// Point-in-time view of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    /// Stage name.
    pub name: String,
    /// Name of the stage this one forwards to.
    pub next: Option<String>,
    /// Executor state.
    pub executor: ExecutorStats,
    /// Failures in the shared registry.
    pub pipeline_failures: usize,
}

impl Stage {
    /// Creates a stage served by `workers` background threads.
    pub fn pooled<F>(
        name: impl Into<String>,
        workers: usize,
        queue_capacity: usize,
        function: F,
    ) -> Result<Self>
    where
        F: Fn(usize) -> TaskResult + Send + Sync + 'static,
    {
        let name = name.into();
        let executor = PooledExecutor::new(name.clone(), workers, queue_capacity)?;
        Ok(Self::with_executor(name, Box::new(executor), function))
    }

    /// Creates a stage whose tasks run on the thread that calls [`Stage::run`].
    pub fn inline<F>(name: impl Into<String>, queue_capacity: usize, function: F) -> Result<Self>
    where
        F: Fn(usize) -> TaskResult + Send + Sync + 'static,
    {
        let name = name.into();
        let executor = InlineExecutor::new(name.clone(), queue_capacity)?;
        Ok(Self::with_executor(name, Box::new(executor), function))
    }

    /// Creates a stage from a configuration.
    pub fn from_config<F>(config: &StageConfig, function: F) -> Result<Self>
    where
        F: Fn(usize) -> TaskResult + Send + Sync + 'static,
    {
        config.validate()?;
        match config.mode {
            ExecutionMode::Pooled { workers } => {
                Self::pooled(config.name.clone(), workers, config.queue_capacity, function)
            }
            ExecutionMode::Inline => {
                Self::inline(config.name.clone(), config.queue_capacity, function)
            }
        }
    }

    fn with_executor<F>(name: String, executor: Box<dyn Executor>, function: F) -> Self
    where
        F: Fn(usize) -> TaskResult + Send + Sync + 'static,
    {
        let mode = executor.mode();
        debug!(
            stage = %name,
            mode = ?mode,
            consumers = mode.consumers(),
            "Stage created"
        );
        Self {
            inner: Arc::new(StageInner {
                name,
                executor,
                function: Box::new(function),
                next: RwLock::new(None),
                registry: RwLock::new(Arc::new(PipelineRegistry::new())),
            }),
        }
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// How this stage consumes its queue.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.inner.executor.mode()
    }

    /// The stage this one forwards to.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        self.inner.next.read().clone()
    }

    /// The registry this stage records failures into.
    #[must_use]
    pub fn registry(&self) -> Arc<PipelineRegistry> {
        Arc::clone(&self.inner.registry.read())
    }

    /// Tasks still expected, or `None` before the count is set.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.inner.executor.stats().remaining
    }

    /// Snapshot of the stage and its executor.
    #[must_use]
    pub fn stats(&self) -> StageStats {
        StageStats {
            name: self.inner.name.clone(),
            next: self.next().map(|next| next.name().to_string()),
            executor: self.inner.executor.stats(),
            pipeline_failures: self.registry().len(),
        }
    }

    /// Returns true if both handles refer to the same stage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sets how many indices this stage will receive. Call once, before the
    /// first push (including pushes forwarded from an upstream stage).
    pub fn set_task_count(&self, n: usize) -> Result<()> {
        self.inner.executor.set_task_count(n)
    }

    /// Enqueues one work index, blocking while the queue is full.
    ///
    /// Queued work does not keep the stage alive: once every handle is
    /// dropped, the executor shuts down and unprocessed indices are
    /// discarded.
    pub fn push(&self, index: usize) -> Result<()> {
        let stage: Weak<StageInner> = Arc::downgrade(&self.inner);
        self.inner.executor.push_task(Box::new(move || match stage.upgrade() {
            Some(inner) => Stage { inner }.process(index),
            None => trace!(index, "Stage dropped before task ran"),
        }))
    }

    /// Blocks until this stage has drained, then reports pipeline failures.
    ///
    /// Returns [`StagechainError::Aggregate`] covering the whole shared
    /// registry if any task anywhere in the chain has failed so far. Works
    /// for inline stages too, provided another thread calls [`Stage::run`].
    pub fn wait(&self) -> Result<()> {
        let timer = SpanTimer::start(self.name());
        self.inner.executor.wait();
        info!(stage = %self.name(), elapsed_ms = timer.finish(), "Stage drained");
        self.check_failures()
    }

    /// Runs an inline stage on the calling thread until it drains, then
    /// reports pipeline failures like [`Stage::wait`].
    pub fn run(&self) -> Result<()> {
        let timer = SpanTimer::start(self.name());
        self.inner.executor.run()?;
        info!(stage = %self.name(), elapsed_ms = timer.finish(), "Inline stage drained");
        self.check_failures()
    }

    fn check_failures(&self) -> Result<()> {
        match self.registry().aggregate() {
            Some(aggregate) => {
                warn!(
                    stage = %self.name(),
                    run_id = %aggregate.run_id(),
                    failures = aggregate.total(),
                    "Pipeline finished with failures"
                );
                Err(aggregate.into())
            }
            None => Ok(()),
        }
    }

    fn process(&self, index: usize) {
        trace!(stage = %self.name(), index, "Processing task");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.inner.function)(index)))
            .unwrap_or_else(|payload| Err(TaskError::from_panic(&*payload)));
        if let Err(error) = outcome {
            self.record_failure(index, &error);
        }

        if let Some(next) = self.next() {
            if let Err(err) = next.push(index) {
                next.record_failure(index, &TaskError::from(err));
            }
        }
    }

    fn record_failure(&self, index: usize, error: &TaskError) {
        warn!(
            stage = %self.name(),
            index,
            kind = error.kind(),
            message = error.message(),
            "Task failed"
        );
        self.registry()
            .append(FailureRecord::new(self.name(), index, error));
    }

    fn set_registry(&self, registry: Arc<PipelineRegistry>) {
        *self.inner.registry.write() = registry;
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.inner.name)
            .field("executor", &self.inner.executor)
            .field("next", &self.next().map(|next| next.name().to_string()))
            .finish()
    }
}

/// Links `upstream -> downstream` and unifies their registries.
///
/// `downstream` and every stage after it are rebound to `upstream`'s
/// registry, so chaining `a -> b` then `b -> c`, or `b -> c` then `a -> b`,
/// leaves all three sharing one registry. Returns `downstream` so calls can
/// be nested. Links that would close a cycle are rejected.
pub fn chain<'a>(upstream: &Stage, downstream: &'a Stage) -> Result<&'a Stage> {
    let mut members = Vec::new();
    let mut cursor = Some(downstream.clone());
    while let Some(stage) = cursor {
        if stage.ptr_eq(upstream) {
            return Err(StagechainError::ChainCycle {
                from: upstream.name().to_string(),
                to: downstream.name().to_string(),
            });
        }
        cursor = stage.next();
        members.push(stage);
    }

    let replaced = upstream.inner.next.write().replace(downstream.clone());
    if let Some(previous) = replaced {
        debug!(
            stage = %upstream.name(),
            previous = %previous.name(),
            "Replacing existing forward link"
        );
    }

    let registry = upstream.registry();
    for stage in &members {
        stage.set_registry(Arc::clone(&registry));
    }
    debug!(
        from = %upstream.name(),
        to = %downstream.name(),
        rebound = members.len(),
        run_id = %registry.run_id(),
        "Stages chained"
    );
    Ok(downstream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Stage {
        Stage::pooled(name, 1, 2, |_| Ok(())).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            Stage::pooled("a", 0, 2, |_| Ok(())),
            Err(StagechainError::InvalidWorkerCount(0))
        ));
        assert!(matches!(
            Stage::inline("b", 0, |_| Ok(())),
            Err(StagechainError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_from_config() {
        let stage = Stage::from_config(&StageConfig::inline("render").with_queue_capacity(3), |_| {
            Ok(())
        })
        .unwrap();
        assert_eq!(stage.name(), "render");
        assert_eq!(stage.mode(), ExecutionMode::Inline);
        assert_eq!(stage.stats().executor.queue_capacity, 3);

        let pooled = Stage::from_config(&StageConfig::pooled("cpu", 2), |_| Ok(())).unwrap();
        assert_eq!(pooled.mode(), ExecutionMode::Pooled { workers: 2 });
    }

    #[test]
    fn test_each_stage_starts_with_own_registry() {
        let a = noop("a");
        let b = noop("b");
        assert!(!Arc::ptr_eq(&a.registry(), &b.registry()));
    }

    #[test]
    fn test_chain_links_and_shares_registry() {
        let a = noop("a");
        let b = noop("b");
        let returned = chain(&a, &b).unwrap();

        assert!(returned.ptr_eq(&b));
        assert!(a.next().unwrap().ptr_eq(&b));
        assert!(Arc::ptr_eq(&a.registry(), &b.registry()));
        assert_eq!(a.stats().next.as_deref(), Some("b"));
    }

    #[test]
    fn test_chain_order_independence() {
        let (a, b, c) = (noop("a"), noop("b"), noop("c"));
        chain(&a, &b).unwrap();
        chain(&b, &c).unwrap();
        assert!(Arc::ptr_eq(&a.registry(), &c.registry()));
        assert!(Arc::ptr_eq(&b.registry(), &c.registry()));

        let (a, b, c) = (noop("a"), noop("b"), noop("c"));
        chain(&b, &c).unwrap();
        chain(&a, &b).unwrap();
        assert!(Arc::ptr_eq(&a.registry(), &b.registry()));
        assert!(Arc::ptr_eq(&a.registry(), &c.registry()));
    }

    #[test]
    fn test_chain_rejects_cycles() {
        let (a, b, c) = (noop("a"), noop("b"), noop("c"));
        chain(&a, &b).unwrap();
        chain(&b, &c).unwrap();

        let err = chain(&c, &a).unwrap_err();
        assert!(matches!(
            err,
            StagechainError::ChainCycle { ref from, ref to } if from == "c" && to == "a"
        ));
        assert!(c.next().is_none());
        assert!(matches!(
            chain(&a, &a),
            Err(StagechainError::ChainCycle { .. })
        ));
    }

    #[test]
    fn test_run_on_pooled_stage_rejected() {
        let stage = noop("pool");
        assert!(matches!(stage.run(), Err(StagechainError::NotInline(name)) if name == "pool"));
    }

    #[test]
    fn test_push_requires_task_count() {
        let stage = noop("a");
        assert!(matches!(stage.push(0), Err(StagechainError::TaskCountNotSet)));
    }

    #[test]
    fn test_zero_tasks_returns_immediately() {
        let stage = noop("a");
        stage.set_task_count(0).unwrap();
        stage.wait().unwrap();
        assert_eq!(stage.remaining(), Some(0));
    }

    #[test]
    fn test_debug_output_names_stage() {
        let stage = noop("debuggable");
        stage.set_task_count(0).unwrap();
        assert!(format!("{stage:?}").contains("debuggable"));
    }
}
