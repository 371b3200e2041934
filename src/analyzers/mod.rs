//! Pluggable per-statistic analyzers over reconstructed attempts
//!
//! Each analyzer is a pure function of one complete attempt; an
//! `AnalyzerGroup` composes several analyzers over the same attempt stream
//! and merges their deltas index-wise. Analyzers must not depend on attempt
//! processing order: deltas for the same (stat, key) simply add.

pub mod attempts;
pub mod trybot;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{entry_map, StatKey};
use crate::reconstruct::Attempt;

pub use attempts::{AttemptCountAnalyzer, CommitCountAnalyzer};
pub use trybot::{FalseRejectAnalyzer, TrybotRunAnalyzer};

/// One statistic's contribution from a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDelta {
    pub name: String,
    pub description: String,
    #[serde(with = "entry_map")]
    pub tally: BTreeMap<StatKey, u64>,
}

impl StatDelta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tally: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: StatKey, delta: u64) {
        *self.tally.entry(key).or_insert(0) += delta;
    }

    /// Fold another delta for the same stat into this one.
    pub fn merge(&mut self, other: &StatDelta) {
        for (key, delta) in &other.tally {
            *self.tally.entry(key.clone()).or_insert(0) += delta;
        }
    }
}

/// A single statistic producer.
pub trait Analyzer: Send + Sync {
    /// Identifier used for configuration and logging.
    fn name(&self) -> &'static str;

    /// Contributions of one complete attempt, as (stat, key, delta) tallies.
    fn contribute(&self, attempt: &Attempt) -> Vec<StatDelta>;
}

/// Ordered collection of analyzers run over the same attempt stream.
pub struct AnalyzerGroup {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnalyzerGroup {
    pub fn new(analyzers: Vec<Box<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    /// All built-in analyzers.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(TrybotRunAnalyzer),
            Box::new(FalseRejectAnalyzer),
            Box::new(AttemptCountAnalyzer),
            Box::new(CommitCountAnalyzer),
        ])
    }

    /// Drop analyzers whose `name()` appears in `disabled`.
    pub fn without(mut self, disabled: &[String]) -> Self {
        self.analyzers
            .retain(|a| !disabled.iter().any(|d| d == a.name()));
        self
    }

    pub fn analyzer_names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Run every analyzer over every complete attempt and merge the deltas.
    ///
    /// Incomplete attempts are never fed to analyzers: an attempt lacking a
    /// stop is excluded from every tally, not counted as zero.
    pub fn analyze(&self, attempts: &[Attempt]) -> BTreeMap<String, StatDelta> {
        let mut merged: BTreeMap<String, StatDelta> = BTreeMap::new();
        let mut analyzed = 0usize;

        for attempt in attempts.iter().filter(|a| a.is_complete()) {
            analyzed += 1;
            for analyzer in &self.analyzers {
                for delta in analyzer.contribute(attempt) {
                    merged
                        .entry(delta.name.clone())
                        .and_modify(|existing| existing.merge(&delta))
                        .or_insert(delta);
                }
            }
        }

        debug!(
            "analyzed {} complete attempts into {} stats",
            analyzed,
            merged.len()
        );
        merged
    }
}
