//! Configuration validation.
//!
//! Returns all validation errors, not just the first one.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{ProxyConfig, ServerList};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.limiter.refill_interval_ms == 0 {
        errors.push(ValidationError::new(
            "limiter.refill_interval_ms",
            "must be greater than 0",
        ));
    }
    let limiter = &config.limiter;
    if limiter.default_capacity < 0 || limiter.default_rate_per_sec < 0 {
        errors.push(ValidationError::new("limiter", "default tokens must not be negative"));
    }
    if limiter.default_capacity == 0 && limiter.default_rate_per_sec == 0 {
        errors.push(ValidationError::new(
            "limiter",
            "default capacity and rate cannot both be zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_servers(list: &ServerList) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    if list.servers.is_empty() {
        errors.push(ValidationError::new("servers", "at least one server is required"));
    }

    for (i, server) in list.servers.iter().enumerate() {
        if server.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("servers[{i}].host"), "must not be empty"));
        }
        if !names.insert(server.name.as_str()) {
            errors.push(ValidationError::new(
                format!("servers[{i}].name"),
                format!("duplicate server name '{}'", server.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
