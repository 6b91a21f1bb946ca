//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open user store → Connect server pool → Spawn refill task
//!     → Bind front end → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger drain
//!
//! Shutdown (shutdown.rs):
//!     Stop refill timer → Stop every backend → Wait for all backends
//!     → Stop front end (bounded) → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store and pool first, listeners last
//! - The front end closes only after the pool has fully drained
//! - Only the front-end stop is bounded; backends bound themselves

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{DrainController, Shutdown};
pub use startup::{start, start_with_servers, Running, StartupError};
