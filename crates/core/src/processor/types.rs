//! Types for the processor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::hashing::FileRecord;

/// Status of a processing pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name ("runs", "files").
    pub name: String,
    /// Number of active jobs.
    pub active_jobs: usize,
    /// Maximum concurrent jobs.
    pub max_concurrent: usize,
    /// Number of jobs waiting for a slot.
    pub queued_jobs: usize,
    /// Total jobs processed since startup.
    pub total_processed: u64,
    /// Total jobs failed since startup.
    pub total_failed: u64,
}

/// Overall processor status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorStatus {
    /// Outer pool, one slot per run.
    pub run_pool: PoolStatus,
    /// Inner pool shared by all runs, one slot per data file.
    pub file_pool: PoolStatus,
    /// Run numbers currently being processed.
    pub active_runs: Vec<u64>,
    /// Runs waiting for a matching rule.
    pub backlog_len: usize,
    /// Number of rules in the active rule set.
    pub rule_count: usize,
    /// Runs handed to a worker since startup.
    pub total_dispatched: u64,
    /// Runs whose files could not be attached since startup.
    pub total_orphaned: u64,
}

/// Tracks statistics for a processing pool.
#[derive(Default)]
pub(crate) struct PoolStats {
    pub(crate) active: AtomicU64,
    pub(crate) queued: AtomicU64,
    pub(crate) total_processed: AtomicU64,
    pub(crate) total_failed: AtomicU64,
}

impl PoolStats {
    pub(crate) fn to_status(&self, name: &str, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            max_concurrent,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Final state of a processed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Files were processed and the publication step finished.
    Completed,
    /// Files were processed but could not be attached to a run entry.
    Orphaned,
    /// The run could not be processed at all.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Orphaned => "orphaned",
            Self::Failed => "failed",
        }
    }
}

/// Step at which a single file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Log,
    Stage,
    Raw,
    Unpack,
    Output,
}

/// A file that could not be fully processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub stage: FileStage,
    pub error: String,
}

/// What happened when records were sent to the tracking database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The records were attached to the run entry.
    Published { run_id: String, files: usize },
    /// No run entry became available in time, or the database refused.
    Orphaned {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        orphan_id: Option<i64>,
    },
    /// There was nothing to publish.
    Skipped,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Orphaned { .. } => "orphaned",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of processing one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run number.
    pub run: u64,
    /// Name of the rule the run was processed with.
    pub rule: String,
    pub status: RunStatus,
    /// Records produced, in completion order.
    pub records: Vec<FileRecord>,
    /// Files that failed along the way.
    pub file_failures: Vec<FileFailure>,
    /// Whether the unpacking image was available.
    pub image_ready: bool,
    pub publish: PublishOutcome,
    /// Processing duration in milliseconds.
    pub duration_ms: u64,
    /// Error that stopped the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub(crate) fn new(run: u64, rule: &str) -> Self {
        Self {
            run,
            rule: rule.to_string(),
            status: RunStatus::Completed,
            records: Vec::new(),
            file_failures: Vec::new(),
            image_ready: false,
            publish: PublishOutcome::Skipped,
            duration_ms: 0,
            error: None,
        }
    }

    /// Number of records of the given type.
    pub fn count_of(&self, file_type: crate::hashing::FileType) -> usize {
        self.records
            .iter()
            .filter(|r| r.file_type == file_type)
            .count()
    }
}

/// Callback invoked after every run finishes.
pub type RunCompletionCallback = Arc<dyn Fn(&RunReport) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_to_status() {
        let stats = PoolStats::default();
        stats.active.fetch_add(2, Ordering::Relaxed);
        stats.total_failed.fetch_add(1, Ordering::Relaxed);

        let status = stats.to_status("runs", 4);
        assert_eq!(status.name, "runs");
        assert_eq!(status.active_jobs, 2);
        assert_eq!(status.max_concurrent, 4);
        assert_eq!(status.total_failed, 1);
    }

    #[test]
    fn test_publish_outcome_serialization() {
        let outcome = PublishOutcome::Orphaned {
            reason: "run not visible".to_string(),
            orphan_id: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "orphaned");
        assert!(json.get("orphan_id").is_none());
    }
}
