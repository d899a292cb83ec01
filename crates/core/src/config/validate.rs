use super::{types::Config, ConfigError};
use crate::rules::RuleSet;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Pool sizes are not 0
/// - Tracking URL is set
/// - Rules compile (patterns, templates, unique names)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.processor.max_parallel_runs == 0 {
        return Err(ConfigError::ValidationError(
            "processor.max_parallel_runs cannot be 0".to_string(),
        ));
    }

    if config.processor.max_parallel_files == 0 {
        return Err(ConfigError::ValidationError(
            "processor.max_parallel_files cannot be 0".to_string(),
        ));
    }

    if config.tracking.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "tracking.url cannot be empty".to_string(),
        ));
    }

    RuleSet::compile(&config.rules).map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    Ok(())
}
