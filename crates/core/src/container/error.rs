//! Error types for the container module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Runtime binary not found.
    #[error("Container runtime not found at path: {path}")]
    RuntimeNotFound { path: PathBuf },

    /// The registry does not know the image.
    #[error("Image not found: {image}")]
    ImageNotFound { image: String },

    /// Pulling the image failed for another reason.
    #[error("Failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },

    /// The container exited unsuccessfully.
    #[error("Container {image} exited with code {exit_code:?}")]
    RunFailed {
        image: String,
        exit_code: Option<i32>,
        logs: String,
    },

    /// The container did not finish in time.
    #[error("Container timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Input file for the container is missing.
    #[error("Container input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Creates a pull failed error.
    pub fn pull_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PullFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is the benign "image unknown to the registry" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound { .. })
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ImageNotFound { .. } | Self::PullFailed { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }
}
