//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (request ID assigned and echoed)
//!     → users.rs (registration and token management endpoints)
//!     → server.rs balance handler
//!         → admission → round robin → proxy.rs (cached forwarding handle)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod server;
pub mod users;

pub use proxy::{ForwardingHandle, ProxyCache};
pub use request::{request_id, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
