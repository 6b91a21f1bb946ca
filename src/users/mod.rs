//! User registry and token-bucket state holder.
//!
//! # Data Flow
//! ```text
//! POST /user/create → store.rs (unique name, fresh API key, full bucket)
//! Authorization header → store.rs authenticate → AuthenticatedUser extension
//! Admission pipeline → check_can_request / request_done on the user's bucket
//! Refill task → refill_all (one locked step per user)
//! ```
//!
//! # Design Decisions
//! - Store is an explicitly constructed value shared via Arc, never a global
//! - Per-user atomicity comes from the map entry lock
//! - Persistence is a JSON snapshot written on registration and token changes

pub mod store;

pub use store::{AuthenticatedUser, CreatedUser, Profile, StoreError, UserRecord, UserStore};
