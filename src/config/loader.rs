//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, ServerList};
use crate::config::validation::{validate_config, validate_servers, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate the backend server list.
pub fn load_servers(path: &Path) -> Result<ServerList, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_servers(&content)
}

/// Parse and validate a server list from TOML text.
pub fn parse_servers(content: &str) -> Result<ServerList, ConfigError> {
    let list: ServerList = toml::from_str(content)?;

    validate_servers(&list).map_err(ConfigError::Validation)?;

    Ok(list)
}
