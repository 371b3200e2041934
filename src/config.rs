//! Engine configuration, loadable from a TOML file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::analyzers::AnalyzerGroup;
use crate::error::Result;

/// Configuration for a windowed analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Length of one analysis window in hours.
    pub window_hours: i64,
    /// Analyzer names (`Analyzer::name()`) to leave out of the group.
    pub disabled_analyzers: Vec<String>,
    /// Where the JSON stats store lives.
    pub stats_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            disabled_analyzers: Vec::new(),
            stats_path: PathBuf::from("cq-stats.json"),
        }
    }
}

impl EngineConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let config: Self = toml::from_str(&content)?;
        debug!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// The standard analyzer group minus anything disabled here.
    pub fn analyzer_group(&self) -> AnalyzerGroup {
        AnalyzerGroup::standard().without(&self.disabled_analyzers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.window_hours, 24);
        assert!(config.disabled_analyzers.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            window_hours = 6
            disabled_analyzers = ["commit-count"]
            stats_path = "/var/lib/cqstats/stats.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.window_hours, 6);
        let names = config.analyzer_group().analyzer_names();
        assert!(!names.contains(&"commit-count"));
        assert!(names.contains(&"trybot-runs"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<EngineConfig>("window_days = 1\n").is_err());
    }
}
