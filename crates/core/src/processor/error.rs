//! Error types for the processor module.

use std::path::PathBuf;
use thiserror::Error;

use crate::rules::RuleError;

/// Errors raised while setting up or running the processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The unpacked output glob does not compile.
    #[error("Invalid unpacked pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A pool size of zero was configured.
    #[error("Pool size for {pool} must be at least 1")]
    EmptyPool { pool: &'static str },

    /// A run's metadata could not be turned into paths.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Directory preparation failed.
    #[error("Failed to prepare directory {path}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
