//! Types for the tracking module.

use serde::{Deserialize, Serialize};

/// Lookup key of a run in the tracking database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub run_number: u64,
    pub experiment: String,
    pub facility: String,
}

impl RunKey {
    pub fn new(
        run_number: u64,
        experiment: impl Into<String>,
        facility: impl Into<String>,
    ) -> Self {
        Self {
            run_number,
            experiment: experiment.into(),
            facility: facility.into(),
        }
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} ({}/{})",
            self.run_number, self.experiment, self.facility
        )
    }
}

/// A run entry as stored by the tracking database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    /// Database identifier that file records are attached to.
    pub run_id: String,
    /// Run number, when the database echoes it back.
    #[serde(default)]
    pub run_number: Option<u64>,
}
