//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → pool.rs (ServerPool: descriptors, stop signals, drain barrier)
//!     → round_robin.rs (inspect the slot under the cursor, then advance)
//!     → backend address, or nothing when that slot is busy
//! ```
//!
//! # Design Decisions
//! - One slot is inspected per call; a busy slot is a miss, not a scan
//! - The cursor advances on every call, hit or miss
//! - Each backend runs as its own task with a one-shot stop signal

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::{BackendDescriptor, BackendSettings};
pub use pool::ServerPool;
pub use round_robin::RoundRobin;

/// Chooses the backend address for the next request.
pub trait Balancer: Send + Sync {
    /// Address to forward to, or `None` when no server is available for this call.
    fn redirect(&self) -> Option<String>;
}
