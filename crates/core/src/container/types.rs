//! Types for the container module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single unpacking invocation.
///
/// The input file is mounted read-only, the output directory read-write, and
/// the container never gets network access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRun {
    /// Image to run.
    pub image: String,
    /// Input file on the host.
    pub input: PathBuf,
    /// Output directory on the host.
    pub output_dir: PathBuf,
}

/// Result of a successful container invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOutput {
    /// Exit code reported by the runtime.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub logs: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}
