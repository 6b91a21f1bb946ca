//! Round-robin HTTP balancer with per-user token-bucket admission.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod security;
pub mod users;

pub use config::schema::ProxyConfig;
pub use error::BalancerError;
pub use http::HttpServer;
pub use lifecycle::{DrainController, Shutdown};
pub use load_balancer::{Balancer, ServerPool};
pub use users::UserStore;
