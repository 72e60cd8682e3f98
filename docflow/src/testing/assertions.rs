//! Test assertions for pipeline reports.

use std::collections::HashMap;

use crate::core::{Source, StageKind};
use crate::pipeline::PipelineReport;

/// Asserts that every source ended in exactly one outcome: one artifact or one
/// stage error, never both and never neither.
pub fn assert_one_outcome_per_source(report: &PipelineReport, sources: &[Source]) {
    let mut outcomes: HashMap<&str, usize> = HashMap::new();
    for artifact in &report.rendered {
        *outcomes.entry(artifact.source_id.as_str()).or_default() += 1;
    }
    for error in &report.errors {
        *outcomes.entry(error.item()).or_default() += 1;
    }

    for source in sources {
        let count = outcomes.remove(source.id.as_str()).unwrap_or(0);
        assert_eq!(count, 1, "Expected exactly one outcome for '{}', got {count}", source.id);
    }
    assert!(
        outcomes.is_empty(),
        "Outcomes for unknown items: {:?}",
        outcomes.keys().collect::<Vec<_>>()
    );
}

/// Asserts the set of items a stage failed, ignoring order.
pub fn assert_stage_failed(report: &PipelineReport, stage: StageKind, expected: &[&str]) {
    let mut actual: Vec<&str> = report.errors_for(stage).map(|e| e.item()).collect();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected {stage} failures");
}

/// Asserts the set of sources that were rendered, ignoring order.
pub fn assert_rendered(report: &PipelineReport, expected: &[&str]) {
    let mut actual: Vec<&str> = report.rendered.iter().map(|a| a.source_id.as_str()).collect();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected rendered sources");
}
