use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "RUP_CONFIG";

/// Configuration file used when `RUP_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "rup.toml";

/// Load configuration from file with environment variable overrides.
///
/// Overrides use the `RUP_` prefix with `__` between sections, e.g.
/// `RUP_SERVER__PORT=9000` or `RUP_TRACKING__TOKEN=...`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("RUP_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
