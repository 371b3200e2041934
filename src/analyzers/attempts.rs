//! Attempt-level count statistics

use super::{Analyzer, StatDelta};
use crate::models::StatKey;
use crate::reconstruct::Attempt;

/// Counts CQ attempts per patchset.
pub struct AttemptCountAnalyzer;

impl Analyzer for AttemptCountAnalyzer {
    fn name(&self) -> &'static str {
        "attempt-count"
    }

    fn contribute(&self, attempt: &Attempt) -> Vec<StatDelta> {
        let mut delta = StatDelta::new("attempt-count", "Number of CQ attempts made.");
        delta.add(StatKey::Patchset(attempt.patchset), 1);
        vec![delta]
    }
}

/// Counts patchsets the CQ committed.
pub struct CommitCountAnalyzer;

impl Analyzer for CommitCountAnalyzer {
    fn name(&self) -> &'static str {
        "commit-count"
    }

    fn contribute(&self, attempt: &Attempt) -> Vec<StatDelta> {
        if !attempt.committed {
            return Vec::new();
        }
        let mut delta = StatDelta::new(
            "patchset-commit-count",
            "Number of patchsets committed by the CQ.",
        );
        delta.add(StatKey::Patchset(attempt.patchset), 1);
        vec![delta]
    }
}
