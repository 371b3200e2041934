//! Persistent stats store with append-only merge semantics
//!
//! A store keeps one `Stat` per statistic name. Merging a window's deltas is
//! index-wise integer addition, creating stats and keys on first observation
//! and never overwriting. Merging is NOT idempotent: reprocessing a window
//! double counts, and serializing concurrent merges into the same stat name
//! is the caller's transaction boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::analyzers::StatDelta;
use crate::error::Result;
use crate::models::{entry_map, StatKey};

/// One named statistic with its keyed integer tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub description: String,
    #[serde(with = "entry_map")]
    pub tally: BTreeMap<StatKey, u64>,
}

impl Stat {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tally: BTreeMap::new(),
        }
    }

    fn apply(&mut self, delta: &StatDelta) {
        for (key, count) in &delta.tally {
            *self.tally.entry(key.clone()).or_insert(0) += count;
        }
    }
}

/// Persistence boundary for computed tallies.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Stat>>;

    /// Merge one whole window's deltas. All-or-nothing per call: there is no
    /// partial-tally commit path.
    async fn merge(&self, deltas: &BTreeMap<String, StatDelta>) -> Result<()>;

    async fn names(&self) -> Result<Vec<String>>;
}

fn merge_into(stats: &mut BTreeMap<String, Stat>, deltas: &BTreeMap<String, StatDelta>) {
    for (name, delta) in deltas {
        stats
            .entry(name.clone())
            .or_insert_with(|| Stat::new(name.clone(), delta.description.clone()))
            .apply(delta);
    }
}

/// In-memory store for tests and single-shot backfills.
#[derive(Default)]
pub struct MemoryStatsStore {
    stats: RwLock<BTreeMap<String, Stat>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn get(&self, name: &str) -> Result<Option<Stat>> {
        Ok(self.stats.read().await.get(name).cloned())
    }

    async fn merge(&self, deltas: &BTreeMap<String, StatDelta>) -> Result<()> {
        let mut stats = self.stats.write().await;
        merge_into(&mut stats, deltas);
        debug!("merged {} stat deltas", deltas.len());
        Ok(())
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.stats.read().await.keys().cloned().collect())
    }
}

/// File-backed store: one JSON document holding every stat, loaded at open
/// and rewritten whole on each merge.
pub struct JsonStatsStore {
    path: PathBuf,
    stats: RwLock<BTreeMap<String, Stat>>,
}

impl JsonStatsStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stats = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        info!("stats store opened at {} ({} stats)", path.display(), stats.len());
        Ok(Self {
            path,
            stats: RwLock::new(stats),
        })
    }

    async fn persist(&self, stats: &BTreeMap<String, Stat>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(stats)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl StatsStore for JsonStatsStore {
    async fn get(&self, name: &str) -> Result<Option<Stat>> {
        Ok(self.stats.read().await.get(name).cloned())
    }

    async fn merge(&self, deltas: &BTreeMap<String, StatDelta>) -> Result<()> {
        let mut stats = self.stats.write().await;
        merge_into(&mut stats, deltas);
        self.persist(&stats).await?;
        debug!(
            "merged {} stat deltas into {}",
            deltas.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.stats.read().await.keys().cloned().collect())
    }
}
