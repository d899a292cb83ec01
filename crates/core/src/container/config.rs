//! Configuration for the container module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the Docker-compatible runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Path to the runtime binary (docker, podman).
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory inside the container where the input file is mounted.
    #[serde(default = "default_input_mount")]
    pub input_mount: String,

    /// Directory inside the container where outputs are written.
    #[serde(default = "default_output_mount")]
    pub output_mount: String,

    /// Timeout for a single unpacking run in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for an image pull in seconds.
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,

    /// Extra arguments inserted before the image name (e.g. `--user`).
    #[serde(default)]
    pub extra_run_args: Vec<String>,

    /// Command and arguments passed after the image name.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_binary() -> PathBuf {
    PathBuf::from("docker")
}

fn default_input_mount() -> String {
    "/input".to_string()
}

fn default_output_mount() -> String {
    "/output".to_string()
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

fn default_pull_timeout() -> u64 {
    900 // 15 minutes
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            input_mount: default_input_mount(),
            output_mount: default_output_mount(),
            timeout_secs: default_timeout(),
            pull_timeout_secs: default_pull_timeout(),
            extra_run_args: Vec::new(),
            command: Vec::new(),
        }
    }
}
