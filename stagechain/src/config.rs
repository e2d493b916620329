//! Configuration types for stages and logging.

use crate::errors::{Result, StagechainError};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::thread;

/// How a stage consumes its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// A pool of background worker threads.
    Pooled {
        /// Number of worker threads.
        workers: usize,
    },
    /// The thread that calls `run()`.
    Inline,
}

impl ExecutionMode {
    /// Number of consumers this mode runs while active.
    #[must_use]
    pub fn consumers(&self) -> usize {
        match self {
            Self::Pooled { workers } => *workers,
            Self::Inline => 1,
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Pooled {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Configuration for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name used in logs and failure reports.
    pub name: String,
    /// Consumption model.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Maximum queued items before producers block.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl StageConfig {
    /// Creates a pooled stage configuration with default sizing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: ExecutionMode::default(),
            queue_capacity: default_queue_capacity(),
        }
    }

    /// Creates a pooled stage configuration.
    #[must_use]
    pub fn pooled(name: impl Into<String>, workers: usize) -> Self {
        Self::new(name).with_mode(ExecutionMode::Pooled { workers })
    }

    /// Creates an inline stage configuration.
    #[must_use]
    pub fn inline(name: impl Into<String>) -> Self {
        Self::new(name).with_mode(ExecutionMode::Inline)
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Checks sizing before any thread is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StagechainError::InvalidCapacity(self.queue_capacity));
        }
        if let ExecutionMode::Pooled { workers: 0 } = self.mode {
            return Err(StagechainError::InvalidWorkerCount(0));
        }
        Ok(())
    }
}

/// Logging configuration for [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "stagechain=info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}
