//! Per-trybot pass/fail and false-reject statistics
//!
//! A run is one terminal status observation for a builder within an attempt.
//! A false reject is a failed run redeemed by a passing run on the same
//! builder within the same attempt: the failure was not the patch's fault.

use super::{Analyzer, StatDelta};
use crate::models::{JobStatus, StatKey};
use crate::reconstruct::Attempt;

fn run_counts(history: &[JobStatus]) -> (u64, u64) {
    let passes = history.iter().filter(|s| **s == JobStatus::Passed).count() as u64;
    let fails = history.iter().filter(|s| **s == JobStatus::Failed).count() as u64;
    (passes, fails)
}

/// Tallies passing and failing runs per builder, both keyed by the patchset
/// the attempt ran for and globally keyed by (master, builder).
pub struct TrybotRunAnalyzer;

impl Analyzer for TrybotRunAnalyzer {
    fn name(&self) -> &'static str {
        "trybot-runs"
    }

    fn contribute(&self, attempt: &Attempt) -> Vec<StatDelta> {
        let mut deltas = Vec::new();
        let mut global_pass = StatDelta::new(
            "trybot-pass-count",
            "Number of passing runs across all trybots.",
        );
        let mut global_fail = StatDelta::new(
            "trybot-fail-count",
            "Number of failing runs across all trybots.",
        );

        for (trybot, history) in &attempt.jobs {
            let (passes, fails) = run_counts(history);
            let patchset_key = StatKey::Patchset(attempt.patchset);
            let trybot_key = StatKey::Trybot(trybot.clone());

            if passes > 0 {
                let mut delta = StatDelta::new(
                    format!("trybot-{}-pass-count", trybot.builder),
                    format!("Number of passing runs by the {} trybot.", trybot.builder),
                );
                delta.add(patchset_key.clone(), passes);
                deltas.push(delta);
                global_pass.add(trybot_key.clone(), passes);
            }
            if fails > 0 {
                let mut delta = StatDelta::new(
                    format!("trybot-{}-fail-count", trybot.builder),
                    format!("Number of failing runs by the {} trybot.", trybot.builder),
                );
                delta.add(patchset_key, fails);
                deltas.push(delta);
                global_fail.add(trybot_key, fails);
            }
        }

        if !global_pass.tally.is_empty() {
            deltas.push(global_pass);
        }
        if !global_fail.tally.is_empty() {
            deltas.push(global_fail);
        }
        deltas
    }
}

/// Tallies false rejects: failed runs on a builder that also produced a
/// passing run on the same patch within the same attempt. Each failed run
/// counts once; a builder that only failed (or only passed) contributes
/// nothing.
pub struct FalseRejectAnalyzer;

impl FalseRejectAnalyzer {
    fn false_rejects(history: &[JobStatus]) -> u64 {
        let (passes, fails) = run_counts(history);
        if passes > 0 {
            fails
        } else {
            0
        }
    }
}

impl Analyzer for FalseRejectAnalyzer {
    fn name(&self) -> &'static str {
        "trybot-false-reject"
    }

    fn contribute(&self, attempt: &Attempt) -> Vec<StatDelta> {
        let mut deltas = Vec::new();
        let mut global = StatDelta::new(
            "trybot-false-reject-count",
            "Number of false rejects across all trybots. This counts any \
             failed runs that also had passing runs on the same patch.",
        );

        for (trybot, history) in &attempt.jobs {
            let rejects = Self::false_rejects(history);
            if rejects == 0 {
                continue;
            }
            let mut delta = StatDelta::new(
                format!("trybot-{}-false-reject-count", trybot.builder),
                format!(
                    "Number of false rejects by the {} trybot. This counts any \
                     failed runs that also had passing runs on the same patch.",
                    trybot.builder
                ),
            );
            delta.add(StatKey::Patchset(attempt.patchset), rejects);
            deltas.push(delta);
            global.add(StatKey::Trybot(trybot.clone()), rejects);
        }

        if !global.tally.is_empty() {
            deltas.push(global);
        }
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatchsetReference, TrybotReference};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn trybot_key(master: &str, builder: &str) -> StatKey {
        StatKey::Trybot(TrybotReference::new(master, builder))
    }

    fn attempt_with_jobs(jobs: &[(&str, &str, &[JobStatus])]) -> Attempt {
        let started = Utc.timestamp_opt(0, 0).unwrap();
        let mut history = BTreeMap::new();
        for (master, builder, statuses) in jobs {
            history.insert(TrybotReference::new(*master, *builder), statuses.to_vec());
        }
        Attempt {
            project: "chromium".to_string(),
            patchset: PatchsetReference::new(1, 1),
            attempt_start_time: started,
            first_start_time: started,
            last_start_time: started,
            first_stop_time: Some(started + chrono::Duration::hours(1)),
            last_stop_time: Some(started + chrono::Duration::hours(1)),
            committed: false,
            was_throttled: false,
            waited_for_tree: false,
            jobs: history,
        }
    }

    #[test]
    fn test_fail_fail_pass_counts_two_false_rejects() {
        let attempt = attempt_with_jobs(&[(
            "test_master_b",
            "test_builder_ffp",
            &[JobStatus::Failed, JobStatus::Failed, JobStatus::Passed],
        )]);
        let deltas = FalseRejectAnalyzer.contribute(&attempt);

        let per_builder = deltas
            .iter()
            .find(|d| d.name == "trybot-test_builder_ffp-false-reject-count")
            .unwrap();
        assert_eq!(
            per_builder.tally[&StatKey::Patchset(PatchsetReference::new(1, 1))],
            2
        );

        let global = deltas
            .iter()
            .find(|d| d.name == "trybot-false-reject-count")
            .unwrap();
        assert_eq!(
            global.tally[&trybot_key("test_master_b", "test_builder_ffp")],
            2
        );
    }

    #[test]
    fn test_all_passes_count_no_false_reject() {
        let attempt = attempt_with_jobs(&[(
            "test_master_a",
            "test_builder_ppp",
            &[JobStatus::Passed, JobStatus::Passed, JobStatus::Passed],
        )]);
        assert!(FalseRejectAnalyzer.contribute(&attempt).is_empty());

        let deltas = TrybotRunAnalyzer.contribute(&attempt);
        let pass = deltas
            .iter()
            .find(|d| d.name == "trybot-test_builder_ppp-pass-count")
            .unwrap();
        assert_eq!(
            pass.tally[&StatKey::Patchset(PatchsetReference::new(1, 1))],
            3
        );
        assert!(!deltas
            .iter()
            .any(|d| d.name == "trybot-test_builder_ppp-fail-count"));
    }

    #[test]
    fn test_all_fails_count_no_false_reject() {
        let attempt = attempt_with_jobs(&[(
            "test_master_b",
            "test_builder_fff",
            &[JobStatus::Failed, JobStatus::Failed, JobStatus::Failed],
        )]);
        assert!(FalseRejectAnalyzer.contribute(&attempt).is_empty());

        let deltas = TrybotRunAnalyzer.contribute(&attempt);
        let fail = deltas
            .iter()
            .find(|d| d.name == "trybot-test_builder_fff-fail-count")
            .unwrap();
        assert_eq!(
            fail.tally[&StatKey::Patchset(PatchsetReference::new(1, 1))],
            3
        );
    }

    #[test]
    fn test_running_statuses_are_not_counted() {
        let attempt = attempt_with_jobs(&[(
            "m",
            "b",
            &[JobStatus::Running, JobStatus::Passed, JobStatus::Running],
        )]);
        let deltas = TrybotRunAnalyzer.contribute(&attempt);
        let pass = deltas
            .iter()
            .find(|d| d.name == "trybot-b-pass-count")
            .unwrap();
        assert_eq!(
            pass.tally[&StatKey::Patchset(PatchsetReference::new(1, 1))],
            1
        );
        assert!(!deltas.iter().any(|d| d.name == "trybot-b-fail-count"));
    }

    #[test]
    fn test_global_tallies_keyed_by_trybot() {
        let attempt = attempt_with_jobs(&[
            ("m1", "b1", &[JobStatus::Passed][..]),
            ("m2", "b2", &[JobStatus::Failed][..]),
        ]);
        let deltas = TrybotRunAnalyzer.contribute(&attempt);
        let global_pass = deltas
            .iter()
            .find(|d| d.name == "trybot-pass-count")
            .unwrap();
        assert_eq!(global_pass.tally[&trybot_key("m1", "b1")], 1);
        let global_fail = deltas
            .iter()
            .find(|d| d.name == "trybot-fail-count")
            .unwrap();
        assert_eq!(global_fail.tally[&trybot_key("m2", "b2")], 1);
    }
}
