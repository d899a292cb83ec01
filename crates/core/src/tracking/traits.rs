//! Trait definitions for the tracking module.

use async_trait::async_trait;

use crate::hashing::FileRecord;

use super::error::TrackingError;
use super::types::{RunEntry, RunKey};

/// The database runs and their files are registered in.
#[async_trait]
pub trait TrackingDatabase: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Looks up a run. `Ok(None)` means the run is not visible yet.
    async fn find_run(&self, key: &RunKey) -> Result<Option<RunEntry>, TrackingError>;

    /// Attaches a batch of file records to a run.
    async fn add_files(&self, run_id: &str, records: &[FileRecord]) -> Result<(), TrackingError>;
}
