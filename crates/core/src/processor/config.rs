//! Configuration for the processor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for run dispatch and the per-run workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum runs processed at the same time.
    #[serde(default = "default_parallelism")]
    pub max_parallel_runs: usize,

    /// Maximum data files copied and unpacked at the same time, shared by all
    /// runs.
    #[serde(default = "default_parallelism")]
    pub max_parallel_files: usize,

    /// Staging directory for copies handed to the unpacker.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Host name recorded in every file record.
    #[serde(default = "default_host")]
    pub host: String,

    /// Glob selecting which unpacker outputs are kept.
    #[serde(default = "default_unpacked_pattern")]
    pub unpacked_pattern: String,

    /// Where sources that lose a name collision are moved. Unset leaves them
    /// in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_dir: Option<PathBuf>,

    /// Read buffer used when hashing files, in bytes.
    #[serde(default = "default_hash_buffer")]
    pub hash_buffer_bytes: usize,

    /// Image acquisition retries.
    #[serde(default)]
    pub image_pull: ImagePullConfig,

    /// Tracking database publication retries.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Exponential backoff used between retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Image acquisition policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePullConfig {
    /// Attempts allowed while the registry reports the image as unknown.
    #[serde(default = "default_not_found_attempts")]
    pub not_found_attempts: u32,

    /// Backoff and total attempt budget for all other failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Publication policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_publish_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Time after which the run is given up on and orphaned, in milliseconds.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("rup-processor")
}

fn default_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_unpacked_pattern() -> String {
    "*.root".to_string()
}

fn default_hash_buffer() -> usize {
    1024 * 1024
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    1000 // 1 second
}

fn default_max_delay() -> u64 {
    60_000 // 1 minute
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_not_found_attempts() -> u32 {
    3
}

fn default_publish_delay() -> u64 {
    5000 // 5 seconds
}

fn default_max_elapsed() -> u64 {
    3_600_000 // 1 hour
}

/// Delay before retry number `attempt` (0-based), capped at `max_ms`.
fn backoff(initial_ms: u64, max_ms: u64, multiplier: f64, attempt: u32) -> Duration {
    let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
    let delay = (initial_ms as f64 * factor).min(max_ms as f64);
    Duration::from_millis(delay as u64)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_retry_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
            attempt,
        )
    }
}

impl Default for ImagePullConfig {
    fn default() -> Self {
        Self {
            not_found_attempts: default_not_found_attempts(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_publish_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_elapsed_ms: default_max_elapsed(),
        }
    }
}

impl PublishConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
            attempt,
        )
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_parallel_runs: default_parallelism(),
            max_parallel_files: default_parallelism(),
            temp_dir: default_temp_dir(),
            host: default_host(),
            unpacked_pattern: default_unpacked_pattern(),
            conflict_dir: None,
            hash_buffer_bytes: default_hash_buffer(),
            image_pull: ImagePullConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl ProcessorConfig {
    /// Sets the maximum parallel runs.
    pub fn with_max_runs(mut self, max: usize) -> Self {
        self.max_parallel_runs = max;
        self
    }

    /// Sets the maximum parallel files.
    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_parallel_files = max;
        self
    }

    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Sets the recorded host name.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the conflict directory.
    pub fn with_conflict_dir(mut self, dir: PathBuf) -> Self {
        self.conflict_dir = Some(dir);
        self
    }

    /// Sets the publication policy.
    pub fn with_publish(mut self, publish: PublishConfig) -> Self {
        self.publish = publish;
        self
    }

    /// Sets the image acquisition policy.
    pub fn with_image_pull(mut self, image_pull: ImagePullConfig) -> Self {
        self.image_pull = image_pull;
        self
    }
}
