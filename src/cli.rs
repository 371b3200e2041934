//! Command-line surface for running windowed analysis batches

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::AnalysisEngine;
use crate::models::{StatKey, TimeRange};
use crate::reconstruct::Attempt;
use crate::source::JsonlRecordSource;
use crate::store::{JsonStatsStore, StatsStore};

/// Reconstruct CQ attempts from event logs and aggregate trybot statistics
#[derive(Parser)]
#[command(name = "cqstats")]
#[command(about = "CQ attempt and flake statistics analyzer", long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one window of event records and merge tallies into the store.
    /// Attempts still open at the window edge are saved to a sidecar file
    /// next to the stats store and resumed by the next invocation.
    Analyze {
        /// JSONL record file, or a directory scanned for *.jsonl files
        #[arg(long)]
        records: PathBuf,

        /// Start of the window (RFC 3339); defaults to one window before --until
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// End of the window (RFC 3339, exclusive); defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Override the stats store path from the config
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Print one persisted statistic by name
    Show {
        /// Statistic name, e.g. trybot-false-reject-count
        name: String,

        /// Path to the JSON stats store
        #[arg(long, default_value = "cq-stats.json")]
        stats: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            records,
            since,
            until,
            config,
            stats,
        } => analyze(records, since, until, config, stats).await,
        Commands::Show { name, stats } => show(&name, stats).await,
    }
}

async fn analyze(
    records: PathBuf,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    config_path: Option<PathBuf>,
    stats_override: Option<PathBuf>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => EngineConfig::load(&path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let end = until.unwrap_or_else(Utc::now);
    let start = since.unwrap_or(end - Duration::hours(config.window_hours));
    if start >= end {
        return Err(anyhow!("window start {} is not before end {}", start, end));
    }
    let window = TimeRange::new(start, end);

    let stats_path = stats_override.unwrap_or_else(|| config.stats_path.clone());
    let source = JsonlRecordSource::new(&records);
    let store = JsonStatsStore::open(&stats_path)
        .await
        .with_context(|| format!("failed to open stats store at {}", stats_path.display()))?;
    let engine = AnalysisEngine::new(config.analyzer_group());

    let carry_file = carry_path(&stats_path);
    let carry = load_carry(&carry_file)
        .await
        .with_context(|| format!("failed to load carried attempts from {}", carry_file.display()))?;

    let summary = engine.run_window(&source, &store, window, carry).await?;

    save_carry(&carry_file, &summary.carried)
        .await
        .with_context(|| format!("failed to save carried attempts to {}", carry_file.display()))?;

    info!("analysis complete");
    println!(
        "window [{}, {}): {} attempts analyzed, {} carried over, {} stats touched, {} records skipped",
        summary.window.start,
        summary.window.end,
        summary.attempts_analyzed,
        summary.carried.len(),
        summary.stats_touched,
        summary.records_skipped
    );
    Ok(())
}

/// Sidecar file holding attempts left open by the previous window,
/// e.g. `cq-stats.json` -> `cq-stats.carry.json`.
fn carry_path(stats_path: &Path) -> PathBuf {
    stats_path.with_extension("carry.json")
}

async fn load_carry(path: &Path) -> Result<Vec<Attempt>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let carried: Vec<Attempt> = serde_json::from_str(&content)?;
    debug!("loaded {} carried attempts from {}", carried.len(), path.display());
    Ok(carried)
}

async fn save_carry(path: &Path, carried: &[Attempt]) -> Result<()> {
    if carried.is_empty() {
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        return Ok(());
    }
    let content = serde_json::to_string_pretty(carried)?;
    tokio::fs::write(path, content).await?;
    debug!("saved {} carried attempts to {}", carried.len(), path.display());
    Ok(())
}

async fn show(name: &str, stats_path: PathBuf) -> Result<()> {
    let store = JsonStatsStore::open(&stats_path)
        .await
        .with_context(|| format!("failed to open stats store at {}", stats_path.display()))?;

    let Some(stat) = store.get(name).await? else {
        let known = store.names().await?;
        return Err(anyhow!(
            "no statistic named '{}' (known: {})",
            name,
            known.join(", ")
        ));
    };

    println!("{}: {}", stat.name, stat.description);
    for (key, count) in &stat.tally {
        match key {
            StatKey::Patchset(p) => println!("  patchset {:>12}  {}", p.to_string(), count),
            StatKey::Trybot(t) => println!("  trybot   {:>12}  {}", t.to_string(), count),
        }
    }
    Ok(())
}
