//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external service traits,
//! allowing end-to-end runs without a container engine or tracking database.
//!
//! # Example
//!
//! ```rust,ignore
//! use rup_core::testing::{fixtures, MockContainerRuntime, MockTrackingDatabase};
//!
//! let runtime = MockContainerRuntime::new();
//! let tracking = MockTrackingDatabase::new();
//! tracking.register_run(RunKey::new(42, "e123", "hall-a"), "r-42").await;
//!
//! let run = fixtures::write_run(dir.path(), 42, "e123", "hall-a", 2);
//! ```

mod mock_container;
mod mock_tracking;

pub use mock_container::{MockContainerRuntime, MockUnpack};
pub use mock_tracking::{MockTrackingDatabase, RecordedBatch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::run::{Run, RunConfig};

    /// Metadata with the two fields every rule needs.
    pub fn run_config(experiment: &str, facility: &str) -> RunConfig {
        let mut config = RunConfig::new();
        config.insert("experiment", experiment);
        config.insert("facility", facility);
        config
    }

    /// A complete run whose files need not exist.
    pub fn complete_run(run: u64, experiment: &str, facility: &str, files: &[PathBuf]) -> Run {
        Run {
            run,
            files: files.to_vec(),
            log_file: Some(PathBuf::from(format!("/incoming/run{:04}.log", run))),
            rup_config: run_config(experiment, facility),
            n_nominal_files: Some(files.len()),
        }
    }

    /// Writes `n_files` data files and a log file for `run` under
    /// `dir/incoming` and returns the complete run describing them.
    pub fn write_run(dir: &Path, run: u64, experiment: &str, facility: &str, n_files: usize) -> Run {
        let incoming = dir.join("incoming");
        std::fs::create_dir_all(&incoming).expect("create incoming dir");

        let files: Vec<PathBuf> = (1..=n_files)
            .map(|i| {
                let path = incoming.join(format!("run{:04}_{:04}.lmd", run, i));
                std::fs::write(&path, format!("raw data of run {} file {}", run, i))
                    .expect("write data file");
                path
            })
            .collect();

        let log_file = incoming.join(format!("run{:04}.log", run));
        std::fs::write(&log_file, format!("log of run {}", run)).expect("write log file");

        Run {
            run,
            files,
            log_file: Some(log_file),
            rup_config: run_config(experiment, facility),
            n_nominal_files: Some(n_files),
        }
    }
}
