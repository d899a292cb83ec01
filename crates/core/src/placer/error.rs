//! Error types for the placer module.

use std::path::PathBuf;
use thiserror::Error;

use crate::hashing::HashError;

/// Errors that can occur while placing a file.
#[derive(Debug, Error)]
pub enum PlacerError {
    /// Source file not found.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The source path does not name a file.
    #[error("Source path has no file name: {path}")]
    NoFileName { path: PathBuf },

    /// Failed to create a destination directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to move/rename file.
    #[error("Failed to move file from {source} to {destination}")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to hash one side of a collision.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// I/O error.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlacerError {
    /// Creates a move failed error.
    pub fn move_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::MoveFailed {
            source,
            destination,
            error,
        }
    }

    /// Creates an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
