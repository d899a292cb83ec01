//! Orphaned runs: runs whose files were processed but never attached to a
//! tracking database entry because the entry did not appear in time.
//!
//! Orphans are persisted with their complete record batch so an operator can
//! replay the attachment once the upstream registration is fixed.

mod sqlite;
mod store;

pub use sqlite::SqliteOrphanStore;
pub use store::{OrphanError, OrphanStore, OrphanedRun};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Orphan store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphansConfig {
    /// Whether orphaned runs are persisted at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// SQLite database path.
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_path() -> PathBuf {
    PathBuf::from("rup-orphans.db")
}

impl Default for OrphansConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
        }
    }
}
