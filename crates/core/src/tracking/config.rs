//! Configuration for the tracking module.

use serde::{Deserialize, Serialize};

/// Connection settings of the HTTP tracking database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL of the API, e.g. `https://runs.example.org/api`.
    pub url: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl TrackingConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}
