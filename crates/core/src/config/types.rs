use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::container::ContainerConfig;
use crate::orphans::OrphansConfig;
use crate::processor::ProcessorConfig;
use crate::rules::RuleConfig;
use crate::tracking::TrackingConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub orphans: OrphansConfig,
    /// Routing rules, tried in order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub processor: ProcessorConfig,
    pub container: ContainerConfig,
    pub tracking: SanitizedTrackingConfig,
    pub orphans: OrphansConfig,
    pub rules: Vec<RuleConfig>,
}

/// Sanitized tracking config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrackingConfig {
    pub url: String,
    pub token_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            logging: config.logging.clone(),
            processor: config.processor.clone(),
            container: config.container.clone(),
            tracking: SanitizedTrackingConfig {
                url: config.tracking.url.clone(),
                token_configured: config
                    .tracking
                    .token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.tracking.timeout_secs,
            },
            orphans: config.orphans.clone(),
            rules: config.rules.clone(),
        }
    }
}
