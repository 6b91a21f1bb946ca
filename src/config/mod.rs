//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! balancer config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value with each subsystem at startup
//!
//! servers file (TOML, [[servers]] tables)
//!     → loader.rs (parse)
//!     → validation.rs (names, hosts)
//!     → ServerList consumed by the round-robin pool
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A missing or unparsable servers file is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_servers, ConfigError};
pub use schema::{
    LimiterConfig, ListenerConfig, ObservabilityConfig, PoolConfig, ProxyConfig, ServerConfig,
    ServerList, StoreConfig, TimeoutConfig,
};
