//! # Stagechain
//!
//! Staged concurrent pipelines built from plain threads.
//!
//! A pipeline is a chain of [`Stage`](pipeline::Stage)s. Each stage owns a
//! bounded work queue and an executor that consumes it, and forwards every
//! work index it finishes to the next stage:
//!
//! - **Backpressure**: producers block while a stage's queue is full
//! - **Completion barriers**: `wait()` returns once every expected index has
//!   been processed, after which the stage's consumers shut down
//! - **Pooled or inline execution**: background worker threads, or the thread
//!   that calls `run()` for thread-affine work
//! - **Aggregate failure reporting**: task errors and panics never stop the
//!   flow; they are collected in a registry shared by the whole chain and
//!   raised as one report
//!
//! ## Quick Start
//!
//! ```rust
//! use stagechain::prelude::*;
//!
//! # fn main() -> stagechain::errors::Result<()> {
//! let parse = Stage::pooled("parse", 2, 8, |_index| Ok(()))?;
//! let store = Stage::pooled("store", 2, 4, |_index| Ok(()))?;
//! chain(&parse, &store)?;
//!
//! let n = 100;
//! parse.set_task_count(n)?;
//! store.set_task_count(n)?;
//! for i in 0..n {
//!     parse.push(i)?;
//! }
//! store.wait()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ExecutionMode, StageConfig, TracingConfig};
    pub use crate::errors::{
        PipelineAggregateError, StagechainError, TaskError, TaskResult,
    };
    pub use crate::executor::{
        CompletionBarrier, Executor, ExecutorStats, InlineExecutor, PooledExecutor,
    };
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{chain, FailureRecord, PipelineRegistry, Stage, StageStats};
    pub use crate::queue::BoundedQueue;
}
