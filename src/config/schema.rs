//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Front-end listener configuration.
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Backend pool settings.
    pub pool: PoolConfig,

    /// Token-bucket limiter settings.
    pub limiter: LimiterConfig,

    /// User store settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time the front end gets to finish in-flight requests once the pool has drained.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

/// Backend pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Path to the servers list.
    pub servers_file: PathBuf,

    /// Simulated processing time per request, in seconds.
    pub dwell_secs: u64,

    /// Grace period each backend gets to stop after its stop signal fires.
    pub shutdown_grace_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            servers_file: PathBuf::from("servers.toml"),
            dwell_secs: 5,
            shutdown_grace_secs: 6,
        }
    }
}

/// Token-bucket limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Refill period in milliseconds.
    pub refill_interval_ms: u64,

    /// Capacity granted to newly registered users.
    pub default_capacity: i64,

    /// Refill rate granted to newly registered users.
    pub default_rate_per_sec: i64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            refill_interval_ms: 1000,
            default_capacity: 5,
            default_rate_per_sec: 1,
        }
    }
}

impl LimiterConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// User store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file users are loaded from and saved to. In-memory only when unset.
    pub persistence_path: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Servers file root: a list of `[[servers]]` tables.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerList {
    pub servers: Vec<ServerConfig>,
}

/// A single backend entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Backend identifier for logging.
    pub name: String,

    /// Host the backend listens on.
    pub host: String,

    /// Port the backend listens on. `0` picks a free port.
    pub port: u16,
}

impl ServerConfig {
    /// Socket address string the backend binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
