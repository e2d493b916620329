//! Stage pipelines.
//!
//! This module provides:
//! - [`Stage`]: an executor plus a user function and a forward link
//! - [`chain`]: linking stages and unifying their failure registries
//! - [`PipelineRegistry`]: the shared failure log and its aggregate report

mod registry;
mod stage;


pub use registry::{render_report, FailureRecord, PipelineRegistry, MAX_REPORTED_FAILURES};
pub use stage::{chain, Stage, StageFn, StageStats};
