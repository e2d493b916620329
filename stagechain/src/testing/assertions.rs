//! Assertions over pipeline failure reports.

use crate::errors::StagechainError;

/// Asserts that `err` is an aggregate report holding exactly the given
/// `(stage, index)` failures, in any order.
pub fn assert_failed_tasks(err: &StagechainError, expected: &[(&str, usize)]) {
    let Some(aggregate) = err.as_aggregate() else {
        panic!("Expected an aggregate pipeline error, got: {err}");
    };

    let mut actual: Vec<(String, usize)> = aggregate
        .records()
        .iter()
        .map(|record| (record.stage.clone(), record.index))
        .collect();
    let mut wanted: Vec<(String, usize)> = expected
        .iter()
        .map(|(stage, index)| ((*stage).to_string(), *index))
        .collect();
    actual.sort();
    wanted.sort();

    assert_eq!(
        actual, wanted,
        "Failed tasks differ from expectation. Report:\n{aggregate}"
    );
}

/// Asserts that the report starts with the `N task(s) failed` header.
pub fn assert_report_header(err: &StagechainError, total: usize) {
    let report = err.to_string();
    let header = format!("{total} task(s) failed in pipeline:");
    assert!(
        report.starts_with(&header),
        "Expected report to start with '{header}', got:\n{report}"
    );
}
