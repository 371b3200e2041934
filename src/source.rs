//! Record sources: the queryable log of CQ event records
//!
//! The real deployment reads a datastore query filtered by a time range;
//! here the boundary is a trait with an in-memory fixture source and a JSONL
//! reader that scans a file or a directory tree of `*.jsonl` logs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{EventRecord, TimeRange};

/// One query's worth of records, plus how many rows the source had to
/// drop because they did not parse.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<EventRecord>,
    pub skipped: usize,
}

/// Queryable, append-only log of event records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records with `range.start <= timestamp < range.end`, ordered by
    /// timestamp. Unparseable rows are skipped and counted, never fatal.
    async fn query(&self, range: TimeRange) -> Result<RecordBatch>;
}

/// Fixture source holding records in memory.
#[derive(Default)]
pub struct MemoryRecordSource {
    records: Vec<EventRecord>,
}

impl MemoryRecordSource {
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn query(&self, range: TimeRange) -> Result<RecordBatch> {
        let mut records: Vec<EventRecord> = self
            .records
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(RecordBatch {
            records,
            skipped: 0,
        })
    }
}

/// Reads event records from JSONL files, one record per line.
///
/// `root` may be a single file or a directory scanned recursively for
/// `*.jsonl` files. Unparseable lines are logged and skipped, never fatal.
pub struct JsonlRecordSource {
    root: PathBuf,
}

impl JsonlRecordSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn jsonl_files(&self) -> Vec<PathBuf> {
        if self.root.is_file() {
            return vec![self.root.clone()];
        }
        walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("jsonl"))
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    async fn read_file(&self, path: &Path, range: TimeRange, out: &mut Vec<EventRecord>) -> Result<usize> {
        let file = File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut skipped = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(&line) {
                Ok(record) => {
                    if range.contains(record.timestamp) {
                        out.push(record);
                    }
                }
                Err(e) => {
                    warn!("skipping unparseable record in {}: {}", path.display(), e);
                    skipped += 1;
                }
            }
        }
        Ok(skipped)
    }
}

#[async_trait]
impl RecordSource for JsonlRecordSource {
    async fn query(&self, range: TimeRange) -> Result<RecordBatch> {
        let mut records = Vec::new();
        let mut skipped = 0usize;
        let files = self.jsonl_files();
        debug!("scanning {} record files under {}", files.len(), self.root.display());

        for path in files {
            skipped += self.read_file(&path, range, &mut records).await?;
        }

        records.sort_by_key(|r| r.timestamp);
        info!(
            "loaded {} records in [{}, {}) ({} lines skipped)",
            records.len(),
            range.start,
            range.end,
            skipped
        );
        Ok(RecordBatch { records, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn range(start_hours: i64, end_hours: i64) -> TimeRange {
        TimeRange::new(
            Utc.timestamp_opt(start_hours * 3600, 0).unwrap(),
            Utc.timestamp_opt(end_hours * 3600, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_jsonl_source_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let content = concat!(
            r#"{"timestamp":"1970-01-01T01:00:00Z","action":"patch_start","issue":1,"patchset":1}"#,
            "\n",
            "this is not json\n",
            r#"{"timestamp":"1970-01-01T02:00:00Z","action":"patch_stop","issue":1,"patchset":1}"#,
            "\n",
        );
        std::fs::write(&path, content).unwrap();

        let source = JsonlRecordSource::new(&path);
        let batch = source.query(range(0, 24)).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert!(batch.records[0].timestamp < batch.records[1].timestamp);
    }

    #[tokio::test]
    async fn test_jsonl_source_scans_directories() {
        let dir = tempfile::tempdir().unwrap();
        let line = r#"{"timestamp":"1970-01-01T01:00:00Z","action":"patch_start","issue":1,"patchset":1}"#;
        std::fs::create_dir(dir.path().join("day1")).unwrap();
        std::fs::write(dir.path().join("day1/a.jsonl"), format!("{line}\n")).unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not a record file").unwrap();

        let source = JsonlRecordSource::new(dir.path());
        let batch = source.query(range(0, 24)).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped, 0);
    }

    #[tokio::test]
    async fn test_query_window_is_half_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let content = concat!(
            r#"{"timestamp":"1970-01-01T00:00:00Z","action":"patch_start","issue":1,"patchset":1}"#,
            "\n",
            r#"{"timestamp":"1970-01-02T00:00:00Z","action":"patch_stop","issue":1,"patchset":1}"#,
            "\n",
        );
        std::fs::write(&path, content).unwrap();

        let source = JsonlRecordSource::new(&path);
        let batch = source.query(range(0, 24)).await.unwrap();
        assert_eq!(batch.records.len(), 1);
    }
}
