//! Configuration loading and validation.

use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Loads and validates configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses and validates configuration from a YAML string.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml(e.to_string()))?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.git.url.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "git.url is required".to_string(),
        });
    }

    if config.reconcile.interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "reconcile.interval_secs must be greater than zero".to_string(),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::Validation {
            message: "server.port must be greater than zero".to_string(),
        });
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "database.path must not be empty".to_string(),
        });
    }

    Ok(())
}
