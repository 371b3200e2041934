//! # cqstats
//!
//! Reconstructs commit-queue (CQ) attempts from an append-only log of
//! timestamped event records and aggregates per-trybot pass, fail and
//! false-reject statistics across analysis windows.
//!
//! Data flow: raw records -> attempt reconstruction -> analyzer group ->
//! keyed tallies -> stats store (append-only merge).
//!
//! ## Modules
//!
//! - `models` - Event records, job statuses and statistic key types
//! - `source` - The queryable record log boundary (JSONL and in-memory)
//! - `reconstruct` - Folding record streams into discrete attempts
//! - `analyzers` - Pluggable per-statistic aggregators and their group
//! - `store` - Persistent stats store with append-only merge semantics
//! - `engine` - Windowed batch runner tying the pieces together
//! - `config` - TOML-loadable engine configuration
//! - `cli` - Command-line surface

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod reconstruct;
pub mod source;
pub mod store;

pub use analyzers::{Analyzer, AnalyzerGroup, StatDelta};
pub use engine::{AnalysisEngine, WindowSummary};
pub use error::{Error, Result};
pub use models::{
    Action, AttemptKey, EventRecord, JobStatus, PatchsetReference, StatKey, TimeRange,
    TrybotReference,
};
pub use reconstruct::{Attempt, AttemptReconstructor};
pub use source::{JsonlRecordSource, MemoryRecordSource, RecordBatch, RecordSource};
pub use store::{JsonStatsStore, MemoryStatsStore, Stat, StatsStore};
