//! Data models for CQ event records and statistics keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Actions recorded by the CQ service for a patchset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PatchStart,
    PatchStop,
    PatchCommitting,
    PatchCommitted,
    PatchFailed,
    PatchReadyToCommit,
    PatchTreeClosed,
    PatchThrottled,
    VerifierJobsUpdate,
    VerifierStart,
    VerifierPass,
    VerifierFail,
    VerifierRetry,
}

/// Status of a single trybot job run, as integer wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum JobStatus {
    Passed,
    Failed,
    Running,
}

impl TryFrom<u8> for JobStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Passed),
            1 => Ok(Self::Failed),
            2 => Ok(Self::Running),
            other => Err(format!("unknown job status code: {}", other)),
        }
    }
}

impl From<JobStatus> for u8 {
    fn from(status: JobStatus) -> u8 {
        match status {
            JobStatus::Passed => 0,
            JobStatus::Failed => 1,
            JobStatus::Running => 2,
        }
    }
}

/// Per-job payload inside a `verifier_jobs_update` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
}

/// A single timestamped fact about one (project, issue, patchset) pair.
///
/// Records are written by the CQ service and are read-only here. Within one
/// (project, issue, patchset) group they form a total order by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    #[serde(default, alias = "cq_name")]
    pub project: String,
    pub issue: i64,
    pub patchset: i64,
    /// Payload of `verifier_jobs_update`: master -> builder -> job state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<BTreeMap<String, BTreeMap<String, JobState>>>,
}

impl EventRecord {
    pub fn attempt_key(&self) -> AttemptKey {
        AttemptKey {
            project: self.project.clone(),
            issue: self.issue,
            patchset: self.patchset,
        }
    }
}

/// Grouping key for event records: one CQ attempt stream per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub project: String,
    pub issue: i64,
    pub patchset: i64,
}

impl AttemptKey {
    pub fn patchset_reference(&self) -> PatchsetReference {
        PatchsetReference {
            issue: self.issue,
            patchset: self.patchset,
        }
    }
}

/// Identifies one patchset of one code review issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchsetReference {
    pub issue: i64,
    pub patchset: i64,
}

impl PatchsetReference {
    pub fn new(issue: i64, patchset: i64) -> Self {
        Self { issue, patchset }
    }
}

impl fmt::Display for PatchsetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.issue, self.patchset)
    }
}

/// Identifies one (master, builder) job configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrybotReference {
    pub master: String,
    pub builder: String,
}

impl TrybotReference {
    pub fn new(master: impl Into<String>, builder: impl Into<String>) -> Self {
        Self {
            master: master.into(),
            builder: builder.into(),
        }
    }
}

impl fmt::Display for TrybotReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.master, self.builder)
    }
}

/// Key of a tally entry: either a patchset or a trybot reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatKey {
    Patchset(PatchsetReference),
    Trybot(TrybotReference),
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patchset(p) => write!(f, "patchset {}", p),
            Self::Trybot(t) => write!(f, "trybot {}", t),
        }
    }
}

/// Half-open time window `[start, end)` for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// Serde helper for maps whose keys are not JSON strings: serialized as a
/// sequence of `[key, value]` entries so they round-trip through JSON.
pub(crate) mod entry_map {
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_patch_start_record() {
        let line = r#"{"timestamp":"2015-06-12T22:00:00Z","action":"patch_start","project":"chromium","issue":1,"patchset":1}"#;
        let record: EventRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.action, Action::PatchStart);
        assert_eq!(record.issue, 1);
        assert!(record.jobs.is_none());
    }

    #[test]
    fn test_parse_jobs_update_record() {
        let line = r#"{
            "timestamp": "2015-06-12T22:00:00Z",
            "action": "verifier_jobs_update",
            "cq_name": "chromium",
            "issue": 1,
            "patchset": 2,
            "jobs": {"test_master_a": {"test_builder_ppp": {"status": 0}}}
        }"#;
        let record: EventRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.action, Action::VerifierJobsUpdate);
        assert_eq!(record.project, "chromium");
        let jobs = record.jobs.unwrap();
        assert_eq!(
            jobs["test_master_a"]["test_builder_ppp"].status,
            JobStatus::Passed
        );
    }

    #[test]
    fn test_unknown_action_is_an_error() {
        let line = r#"{"timestamp":"2015-06-12T22:00:00Z","action":"patch_explode","issue":1,"patchset":1}"#;
        assert!(serde_json::from_str::<EventRecord>(line).is_err());
    }

    #[test]
    fn test_unknown_job_status_is_an_error() {
        let line = r#"{
            "timestamp": "2015-06-12T22:00:00Z",
            "action": "verifier_jobs_update",
            "issue": 1,
            "patchset": 1,
            "jobs": {"m": {"b": {"status": 9}}}
        }"#;
        assert!(serde_json::from_str::<EventRecord>(line).is_err());
    }

    #[test]
    fn test_job_status_wire_codes() {
        assert_eq!(u8::from(JobStatus::Passed), 0);
        assert_eq!(u8::from(JobStatus::Failed), 1);
        assert_eq!(u8::from(JobStatus::Running), 2);
        assert_eq!(JobStatus::try_from(1).unwrap(), JobStatus::Failed);
        assert!(JobStatus::try_from(3).is_err());
    }

    #[test]
    fn test_time_range_is_half_open() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(1);
        let range = TimeRange::new(start, end);
        assert!(range.contains(start));
        assert!(!range.contains(end));
    }
}
