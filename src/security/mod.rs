//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (API key → AuthenticatedUser)
//!     → rate_limit.rs (token bucket admission, consumption, refill)
//!     → Pass to load balancer
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown or missing keys are rejected before any work
//! - Admission checks the bucket; consumption happens after forwarding

pub mod access_control;
pub mod rate_limit;
