//! Windowed batch analysis: records in, merged tallies out
//!
//! One run reads a bounded window of event records, reconstructs attempts
//! per (project, issue, patchset) group, feeds the complete attempts that
//! stopped inside the window to the analyzer group, and merges the resulting
//! deltas into the stats store in one call. Attempts still open at the
//! window edge are handed back to the caller to carry into the next run.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::analyzers::AnalyzerGroup;
use crate::error::Result;
use crate::models::{AttemptKey, EventRecord, TimeRange};
use crate::reconstruct::{Attempt, AttemptReconstructor};
use crate::source::RecordSource;
use crate::store::StatsStore;

/// Outcome of one windowed analysis run.
#[derive(Debug)]
pub struct WindowSummary {
    pub window: TimeRange,
    pub attempts_analyzed: usize,
    /// Unparseable source rows plus records the reconstructor dropped.
    pub records_skipped: usize,
    pub stats_touched: usize,
    /// Incomplete attempts to pass as `carry` to the next window's run.
    pub carried: Vec<Attempt>,
}

/// Batch analysis engine. Reconstruction and analysis are pure and
/// single-threaded; all I/O happens at the source and store boundaries.
pub struct AnalysisEngine {
    group: AnalyzerGroup,
}

impl AnalysisEngine {
    pub fn new(group: AnalyzerGroup) -> Self {
        Self { group }
    }

    pub fn standard() -> Self {
        Self::new(AnalyzerGroup::standard())
    }

    /// Analyze one time window and merge its tallies into the store.
    ///
    /// `carry` holds incomplete attempts from the previous window; their
    /// groups resume folding before any new attempt is opened. The merge is
    /// all-or-nothing for the window; on failure the caller retries the
    /// whole batch. Reprocessing a merged window double counts.
    pub async fn run_window(
        &self,
        source: &dyn RecordSource,
        store: &dyn StatsStore,
        window: TimeRange,
        carry: Vec<Attempt>,
    ) -> Result<WindowSummary> {
        let batch = source.query(window).await?;
        debug!(
            "run_window: {} records in [{}, {}), {} source rows skipped",
            batch.records.len(),
            window.start,
            window.end,
            batch.skipped
        );

        let mut groups: BTreeMap<AttemptKey, Vec<EventRecord>> = BTreeMap::new();
        for record in batch.records {
            groups.entry(record.attempt_key()).or_default().push(record);
        }

        let mut open: BTreeMap<AttemptKey, Attempt> = BTreeMap::new();
        for attempt in carry {
            if attempt.is_complete() {
                warn!(
                    "complete attempt for {} carried into window, ignoring",
                    attempt.patchset
                );
                continue;
            }
            let key = AttemptKey {
                project: attempt.project.clone(),
                issue: attempt.patchset.issue,
                patchset: attempt.patchset.patchset,
            };
            open.insert(key, attempt);
        }

        // All reconstruction state lives in this run.
        let mut reconstructor = AttemptReconstructor::new();
        let mut attempts = Vec::new();

        for (key, mut group_records) in groups {
            group_records.sort_by_key(|r| r.timestamp);
            let reconstructed = match open.remove(&key) {
                Some(resumed) => reconstructor.resume(&key, resumed, &group_records),
                None => reconstructor.reconstruct(&key, &group_records),
            };
            attempts.extend(reconstructed);
        }
        // Groups with no new records stay open into the next window.
        attempts.extend(open.into_values());

        let mut analyzed = Vec::new();
        let mut carried = Vec::new();
        for attempt in attempts {
            match attempt.last_stop_time {
                Some(stopped) if window.contains(stopped) => analyzed.push(attempt),
                Some(stopped) => {
                    // Belongs to another window's tally.
                    debug!(
                        "dropping attempt for {} stopped at {} outside window",
                        attempt.patchset, stopped
                    );
                }
                None => carried.push(attempt),
            }
        }

        let deltas = self.group.analyze(&analyzed);
        store.merge(&deltas).await?;

        let summary = WindowSummary {
            window,
            attempts_analyzed: analyzed.len(),
            records_skipped: batch.skipped + reconstructor.skipped_records(),
            stats_touched: deltas.len(),
            carried,
        };
        info!(
            "window [{}, {}): {} attempts analyzed, {} carried, {} stats touched, {} records skipped",
            window.start,
            window.end,
            summary.attempts_analyzed,
            summary.carried.len(),
            summary.stats_touched,
            summary.records_skipped
        );
        Ok(summary)
    }
}
