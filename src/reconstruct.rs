//! Attempt reconstruction from ordered CQ event records
//!
//! Folds the time-ordered record stream of one (project, issue, patchset)
//! group into discrete attempts: `patch_start` opens an attempt, further
//! records fold into it, `patch_stop` closes it. An attempt left open at the
//! end of the input is returned incomplete and must never be tallied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::{entry_map, Action, AttemptKey, EventRecord, JobStatus, PatchsetReference, TrybotReference};

/// One CQ run over a single patchset, from `patch_start` to `patch_stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub project: String,
    pub patchset: PatchsetReference,
    /// Logical key of the attempt: timestamp of the first `patch_start`
    /// folded into it. Repeated start records within one attempt keep this.
    pub attempt_start_time: DateTime<Utc>,
    pub first_start_time: DateTime<Utc>,
    pub last_start_time: DateTime<Utc>,
    pub first_stop_time: Option<DateTime<Utc>>,
    pub last_stop_time: Option<DateTime<Utc>>,
    pub committed: bool,
    pub was_throttled: bool,
    pub waited_for_tree: bool,
    /// History of observed job statuses per trybot within this attempt.
    /// Every terminal observation (passed/failed) appends one entry; a
    /// repeated running observation for the same builder is collapsed.
    #[serde(with = "entry_map")]
    pub jobs: BTreeMap<TrybotReference, Vec<JobStatus>>,
}

impl Attempt {
    fn open(key: &AttemptKey, started: DateTime<Utc>) -> Self {
        Self {
            project: key.project.clone(),
            patchset: key.patchset_reference(),
            attempt_start_time: started,
            first_start_time: started,
            last_start_time: started,
            first_stop_time: None,
            last_stop_time: None,
            committed: false,
            was_throttled: false,
            waited_for_tree: false,
            jobs: BTreeMap::new(),
        }
    }

    /// An attempt is complete iff a `patch_stop` closed it.
    pub fn is_complete(&self) -> bool {
        self.last_stop_time.is_some()
    }

    fn record_job(&mut self, trybot: TrybotReference, status: JobStatus) {
        let history = self.jobs.entry(trybot).or_default();
        if status == JobStatus::Running && history.last() == Some(&JobStatus::Running) {
            return;
        }
        history.push(status);
    }
}

/// Reconstructs attempts for one record group at a time.
///
/// Holds only per-batch state (the skipped-record counter); a fresh value is
/// created for every analysis run so nothing leaks across batches.
#[derive(Debug, Default)]
pub struct AttemptReconstructor {
    skipped: usize,
}

impl AttemptReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records skipped as malformed or stale across all groups folded so far.
    pub fn skipped_records(&self) -> usize {
        self.skipped
    }

    /// Convert one group's time-ordered records into attempts.
    ///
    /// The returned list contains complete attempts in record order, plus at
    /// most one trailing incomplete attempt if the input ends with a dangling
    /// `patch_start`.
    pub fn reconstruct(&mut self, key: &AttemptKey, records: &[EventRecord]) -> Vec<Attempt> {
        self.fold(key, None, records)
    }

    /// Continue folding records into an attempt carried forward from a
    /// previous window, then reconstruct any further attempts in the input.
    pub fn resume(
        &mut self,
        key: &AttemptKey,
        open: Attempt,
        records: &[EventRecord],
    ) -> Vec<Attempt> {
        self.fold(key, Some(open), records)
    }

    fn fold(
        &mut self,
        key: &AttemptKey,
        open: Option<Attempt>,
        records: &[EventRecord],
    ) -> Vec<Attempt> {
        let mut attempts = Vec::new();
        let mut open = open;

        for record in records {
            if record.attempt_key() != *key {
                warn!(
                    "record for {}/{}/{} fed to group {}/{}/{}, skipping",
                    record.project, record.issue, record.patchset,
                    key.project, key.issue, key.patchset,
                );
                self.skipped += 1;
                continue;
            }

            if record.action == Action::PatchStop {
                match open.take() {
                    Some(mut closed) => {
                        closed.first_stop_time.get_or_insert(record.timestamp);
                        closed.last_stop_time = Some(record.timestamp);
                        attempts.push(closed);
                    }
                    None => {
                        // Tail of an attempt that began before the window.
                        debug!(
                            "skipping patch_stop at {} for {}/{}: no open attempt",
                            record.timestamp, key.issue, key.patchset
                        );
                        self.skipped += 1;
                    }
                }
                continue;
            }

            let Some(attempt) = open.as_mut() else {
                if record.action == Action::PatchStart {
                    open = Some(Attempt::open(key, record.timestamp));
                } else {
                    debug!(
                        "skipping {:?} at {} for {}/{}: no open attempt",
                        record.action, record.timestamp, key.issue, key.patchset
                    );
                    self.skipped += 1;
                }
                continue;
            };

            match record.action {
                Action::PatchStart => {
                    // CQ retries emit repeated starts within one attempt.
                    attempt.last_start_time = record.timestamp;
                }
                Action::PatchCommitted => attempt.committed = true,
                Action::PatchThrottled => attempt.was_throttled = true,
                Action::PatchTreeClosed => attempt.waited_for_tree = true,
                Action::VerifierJobsUpdate => {
                    let Some(jobs) = &record.jobs else {
                        warn!(
                            "verifier_jobs_update without jobs payload at {} for {}/{}, skipping",
                            record.timestamp, key.issue, key.patchset
                        );
                        self.skipped += 1;
                        continue;
                    };
                    for (master, builders) in jobs {
                        for (builder, state) in builders {
                            attempt.record_job(
                                TrybotReference::new(master.clone(), builder.clone()),
                                state.status,
                            );
                        }
                    }
                }
                // Remaining actions carry no state the attempt tracks.
                _ => {}
            }
        }

        if let Some(incomplete) = open {
            debug!(
                "attempt for {}/{} started at {} has no stop, kept incomplete",
                key.issue, key.patchset, incomplete.attempt_start_time
            );
            attempts.push(incomplete);
        }

        attempts
    }
}
