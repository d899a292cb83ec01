use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::FileRecord;

#[derive(Debug, Error)]
pub enum OrphanError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A run whose files were processed but could not be attached to a tracking
/// database entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedRun {
    /// Store-assigned id, `0` until inserted.
    #[serde(default)]
    pub id: i64,
    pub run_number: u64,
    pub experiment: String,
    pub facility: String,
    pub recorded_at: DateTime<Utc>,
    /// Why publication gave up.
    pub reason: String,
    /// Records that still need to be attached.
    pub records: Vec<FileRecord>,
}

impl OrphanedRun {
    pub fn new(
        run_number: u64,
        experiment: impl Into<String>,
        facility: impl Into<String>,
        reason: impl Into<String>,
        records: Vec<FileRecord>,
    ) -> Self {
        Self {
            id: 0,
            run_number,
            experiment: experiment.into(),
            facility: facility.into(),
            recorded_at: Utc::now(),
            reason: reason.into(),
            records,
        }
    }
}

/// Persistent store of orphaned runs
pub trait OrphanStore: Send + Sync {
    /// Insert an orphaned run, returning its id
    fn insert(&self, orphan: &OrphanedRun) -> Result<i64, OrphanError>;

    /// Most recent orphaned runs first
    fn list(&self, limit: i64) -> Result<Vec<OrphanedRun>, OrphanError>;

    fn get(&self, id: i64) -> Result<Option<OrphanedRun>, OrphanError>;

    /// Remove an orphaned run once it has been resolved. Returns whether it existed.
    fn remove(&self, id: i64) -> Result<bool, OrphanError>;

    fn count(&self) -> Result<i64, OrphanError>;
}
