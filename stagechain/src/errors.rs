//! Error types for the stagechain engine.
//!
//! Engine misuse fails fast with a [`StagechainError`]. Failures raised by
//! user functions never unwind through an executor: they are captured as
//! [`TaskError`]s, stored in the shared pipeline registry, and surface once
//! per pipeline as a [`PipelineAggregateError`].

use crate::pipeline::{render_report, FailureRecord};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used by every fallible engine operation.
pub type Result<T> = std::result::Result<T, StagechainError>;

/// Outcome of one user-function invocation.
pub type TaskResult = std::result::Result<(), TaskError>;

/// The main error type for stagechain operations.
#[derive(Debug, Error)]
pub enum StagechainError {
    /// A queue was configured with a capacity of zero.
    #[error("Queue capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// A pooled executor was configured with zero workers.
    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// `set_task_count` was called on an executor that is already armed.
    #[error("Task count already set to {expected}; an executor runs exactly once")]
    TaskCountAlreadySet {
        /// The count set by the first call.
        expected: usize,
    },

    /// Work was pushed before the expected task count was set.
    #[error("Task count must be set before pushing work")]
    TaskCountNotSet,

    /// More work was pushed than the expected task count allows.
    #[error("All {expected} expected tasks have already been pushed")]
    TooManyTasks {
        /// The configured task count.
        expected: usize,
    },

    /// Work was pushed after the executor drained.
    #[error("Executor has already drained")]
    Drained,

    /// The executor's queue was shut down while pushing.
    #[error("Queue is closed")]
    QueueClosed,

    /// `run()` was called while another thread is running the same inline executor.
    #[error("Inline executor '{0}' is already running")]
    AlreadyRunning(String),

    /// `run()` was called on a stage backed by a worker pool.
    #[error("Stage '{0}' is not an inline stage")]
    NotInline(String),

    /// Linking two stages would create a forwarding cycle.
    #[error("Chaining '{from}' -> '{to}' would create a cycle")]
    ChainCycle {
        /// The upstream stage.
        from: String,
        /// The downstream stage.
        to: String,
    },

    /// One or more tasks failed somewhere in the pipeline.
    #[error("{0}")]
    Aggregate(#[from] PipelineAggregateError),

    /// The OS refused to spawn a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl StagechainError {
    /// Returns the aggregate failure report, if this is one.
    #[must_use]
    pub fn as_aggregate(&self) -> Option<&PipelineAggregateError> {
        match self {
            Self::Aggregate(err) => Some(err),
            _ => None,
        }
    }
}

/// An error raised by a user function for one work index.
///
/// Any `E: std::error::Error + Send + Sync + 'static` converts into a
/// `TaskError` with `?`; the kind is the source error's type name
/// (`ParseIntError`, `Error`, ...). For that blanket conversion to exist,
/// `TaskError` itself does not implement [`std::error::Error`].
///
/// Boxed trait objects are not covered by the blanket conversion, because
/// `Box<dyn Error + Send + Sync>` does not implement `Error`. Convert them
/// with `.map_err(TaskError::from_boxed)?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    kind: String,
    message: String,
}

impl TaskError {
    /// Kind used for panics caught inside a user function.
    pub const PANIC_KIND: &'static str = "Panic";

    /// Creates an error with an explicit kind.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an error of the generic `Error` kind.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Converts a boxed error whose concrete type is erased.
    ///
    /// The kind is `Error`; the message is the boxed error's `Display`.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn from_boxed(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::msg(err.to_string())
    }

    /// Converts a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(Self::PANIC_KIND, panic_message(payload))
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for TaskError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }
}

/// Raised by `wait()`/`run()` when the shared registry holds failures.
///
/// Its `Display` output is the pipeline report:
///
/// ```text
/// 2 task(s) failed in pipeline:
///   - Stage 'B', task 7: ParseIntError: invalid digit found in string
///   - Stage 'C', task 40: Error: disk full
/// ```
#[derive(Debug, Clone)]
pub struct PipelineAggregateError {
    run_id: Uuid,
    records: Vec<FailureRecord>,
}

impl PipelineAggregateError {
    pub(crate) fn new(run_id: Uuid, records: Vec<FailureRecord>) -> Self {
        Self { run_id, records }
    }

    /// Total number of failures in the registry at check time.
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// All failure records, in the order they were appended.
    #[must_use]
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// The run id of the registry that produced this report.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl fmt::Display for PipelineAggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_report(&self.records))
    }
}

impl std::error::Error for PipelineAggregateError {}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
