//! Testing utilities for stagechain pipelines.
//!
//! This module provides:
//! - Shared per-index storage that stage functions can mutate
//! - Failure injection for stage functions
//! - Thread-affinity recording
//! - Assertions over aggregate failure reports

mod assertions;
mod fixtures;

pub use assertions::{assert_failed_tasks, assert_report_header};
pub use fixtures::{fail_on, SharedSlots, ThreadLog, INJECTED_FAILURE_KIND};
