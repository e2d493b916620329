//! Shared failure log for a chain of stages.

use crate::errors::{PipelineAggregateError, TaskError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// Maximum number of records rendered individually in a report.
pub const MAX_REPORTED_FAILURES: usize = 5;

/// Record of one failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage whose function failed.
    pub stage: String,
    /// Work index being processed.
    pub index: usize,
    /// Error kind, e.g. `ParseIntError` or `Panic`.
    pub kind: String,
    /// Error message.
    pub message: String,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(stage: impl Into<String>, index: usize, error: &TaskError) -> Self {
        Self {
            stage: stage.into(),
            index,
            kind: error.kind().to_string(),
            message: error.message().to_string(),
            recorded_at: Utc::now(),
        }
    }

    fn render_line(&self) -> String {
        format!(
            "Stage '{}', task {}: {}: {}",
            self.stage, self.index, self.kind, self.message
        )
    }
}

/// Formats the aggregate pipeline report.
///
/// Only the first [`MAX_REPORTED_FAILURES`] records are listed; the rest are
/// summarized in a trailing line.
#[must_use]
pub fn render_report(records: &[FailureRecord]) -> String {
    let mut report = format!("{} task(s) failed in pipeline:", records.len());
    for record in records.iter().take(MAX_REPORTED_FAILURES) {
        let _ = write!(report, "\n  - {}", record.render_line());
    }
    if records.len() > MAX_REPORTED_FAILURES {
        let _ = write!(
            report,
            "\n  ... and {} more",
            records.len() - MAX_REPORTED_FAILURES
        );
    }
    report
}

/// Append-only failure log shared by every stage of a chain.
///
/// Stages append under the registry lock; `wait()`/`run()` read all of it
/// after their own drain. A new run needs a new registry.
#[derive(Debug)]
pub struct PipelineRegistry {
    run_id: Uuid,
    records: Mutex<Vec<FailureRecord>>,
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRegistry {
    /// Creates an empty registry with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Identifier of this pipeline run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Appends a failure record.
    pub fn append(&self, record: FailureRecord) {
        self.records.lock().push(record);
    }

    /// Copy of all records in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if no task has failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Formats the aggregate report over every record.
    #[must_use]
    pub fn report(&self) -> String {
        render_report(&self.records.lock())
    }

    /// Aggregate error over every record, or `None` if nothing failed.
    ///
    /// Every call sees the whole registry, so any number of waiters on any
    /// stage of the chain get the same report.
    pub fn aggregate(&self) -> Option<PipelineAggregateError> {
        let records = self.records.lock();
        if records.is_empty() {
            return None;
        }
        Some(PipelineAggregateError::new(self.run_id, records.clone()))
    }

    /// Summary of the registry as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let records = self.records.lock();
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "total": records.len(),
            "failures": *records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(stage: &str, index: usize) -> FailureRecord {
        FailureRecord::new(stage, index, &TaskError::new("ValueError", format!("bad {index}")))
    }

    #[test]
    fn test_render_single_record() {
        let report = render_report(&[record("Process", 5)]);
        assert_eq!(
            report,
            "1 task(s) failed in pipeline:\n  - Stage 'Process', task 5: ValueError: bad 5"
        );
    }

    #[test]
    fn test_render_truncates_after_five() {
        let records: Vec<_> = (0..8).map(|i| record("S", i)).collect();
        let report = render_report(&records);
        let lines: Vec<_> = report.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "8 task(s) failed in pipeline:");
        assert_eq!(lines[5], "  - Stage 'S', task 4: ValueError: bad 4");
        assert_eq!(lines[6], "  ... and 3 more");
    }

    #[test]
    fn test_render_exactly_five_has_no_trailer() {
        let records: Vec<_> = (0..5).map(|i| record("S", i)).collect();
        let report = render_report(&records);
        assert_eq!(report.lines().count(), 6);
        assert!(!report.contains("more"));
    }

    #[test]
    fn test_append_and_snapshot() {
        let registry = PipelineRegistry::new();
        assert!(registry.is_empty());
        registry.append(record("A", 1));
        registry.append(record("B", 2));

        let snapshot = registry.snapshot();
        assert_eq!(registry.len(), 2);
        assert_eq!(snapshot[0].stage, "A");
        assert_eq!(snapshot[1].index, 2);
    }

    #[test]
    fn test_aggregate_covers_every_record_each_time() {
        let registry = PipelineRegistry::new();
        assert!(registry.aggregate().is_none());

        registry.append(record("A", 1));
        let first = registry.aggregate().unwrap();
        assert_eq!(first.total(), 1);
        assert_eq!(first.run_id(), registry.run_id());

        let again = registry.aggregate().unwrap();
        assert_eq!(again.records(), first.records());

        registry.append(record("B", 2));
        let second = registry.aggregate().unwrap();
        assert_eq!(second.total(), 2);
        assert_eq!(second.to_string(), registry.report());
    }

    #[test]
    fn test_to_json() {
        let registry = PipelineRegistry::new();
        registry.append(record("A", 3));

        let json = registry.to_json();
        assert_eq!(json["total"], 1);
        assert_eq!(json["failures"][0]["stage"], "A");
        assert_eq!(json["failures"][0]["index"], 3);
        assert_eq!(json["failures"][0]["kind"], "ValueError");
        assert_eq!(json["run_id"], registry.run_id().to_string());
    }
}
