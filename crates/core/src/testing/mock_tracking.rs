//! Mock tracking database for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::hashing::FileRecord;
use crate::tracking::{RunEntry, RunKey, TrackingDatabase, TrackingError};

/// A batch of records attached to a run.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub run_id: String,
    pub records: Vec<FileRecord>,
}

#[derive(Debug, Clone)]
struct MockRun {
    entry: RunEntry,
    /// Lookups that still miss before the run becomes visible.
    hidden_for: u32,
}

/// Mock implementation of the TrackingDatabase trait.
///
/// Runs can be made visible only after a number of lookups to simulate an
/// upstream registration that lags behind file processing.
#[derive(Debug, Default)]
pub struct MockTrackingDatabase {
    runs: Arc<RwLock<HashMap<RunKey, MockRun>>>,
    batches: Arc<RwLock<Vec<RecordedBatch>>>,
    lookups: Arc<RwLock<Vec<RunKey>>>,
    /// If set, the next add_files call fails with this error.
    next_add_error: Arc<RwLock<Option<TrackingError>>>,
}

impl MockTrackingDatabase {
    /// Create a new mock database with no runs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run that is visible immediately.
    pub async fn register_run(&self, key: RunKey, run_id: impl Into<String>) {
        self.register_run_after(key, run_id, 0).await;
    }

    /// Register a run that only becomes visible after `misses` lookups.
    pub async fn register_run_after(&self, key: RunKey, run_id: impl Into<String>, misses: u32) {
        let entry = RunEntry {
            run_id: run_id.into(),
            run_number: Some(key.run_number),
        };
        self.runs.write().await.insert(
            key,
            MockRun {
                entry,
                hidden_for: misses,
            },
        );
    }

    /// Configure the next add_files call to fail.
    pub async fn set_next_add_error(&self, error: TrackingError) {
        *self.next_add_error.write().await = Some(error);
    }

    /// All batches attached so far.
    pub async fn recorded_batches(&self) -> Vec<RecordedBatch> {
        self.batches.read().await.clone()
    }

    /// All records attached to `run_id`.
    pub async fn records_for(&self, run_id: &str) -> Vec<FileRecord> {
        self.batches
            .read()
            .await
            .iter()
            .filter(|b| b.run_id == run_id)
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    /// Number of lookups performed.
    pub async fn lookup_count(&self) -> usize {
        self.lookups.read().await.len()
    }
}

#[async_trait]
impl TrackingDatabase for MockTrackingDatabase {
    fn name(&self) -> &str {
        "mock"
    }

    async fn find_run(&self, key: &RunKey) -> Result<Option<RunEntry>, TrackingError> {
        self.lookups.write().await.push(key.clone());

        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(key) else {
            return Ok(None);
        };
        if run.hidden_for > 0 {
            run.hidden_for -= 1;
            return Ok(None);
        }
        Ok(Some(run.entry.clone()))
    }

    async fn add_files(&self, run_id: &str, records: &[FileRecord]) -> Result<(), TrackingError> {
        if let Some(error) = self.next_add_error.write().await.take() {
            return Err(error);
        }

        self.batches.write().await.push(RecordedBatch {
            run_id: run_id.to_string(),
            records: records.to_vec(),
        });
        Ok(())
    }
}
