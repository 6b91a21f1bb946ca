//! Backend abstraction and simulator.
//!
//! # Responsibilities
//! - Represent a single backend server (address, busy/free flag)
//! - Serve requests, holding the backend busy for its dwell time
//! - Watch the stop signal and shut down within a bounded grace period
//!
//! The pool reads `free` without coordinating with the handler that flips
//! it, so two requests can land on one backend in a narrow window. The
//! flag is an admission heuristic, not a reservation.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::{PoolConfig, ServerConfig};

/// Timing shared by every backend in a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    /// How long a request keeps the backend busy.
    pub dwell: Duration,
    /// How long a stopping backend may wait for in-flight requests.
    pub shutdown_grace: Duration,
}

impl From<&PoolConfig> for BackendSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            dwell: Duration::from_secs(config.dwell_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct BackendDescriptor {
    /// Configured name, for logging.
    pub name: String,
    /// URL the proxy forwards to, e.g. `http://localhost:9001/`.
    pub address: String,
    /// Simulated processing time per request.
    pub dwell: Duration,
    free: Mutex<bool>,
    stopped: AtomicBool,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, dwell: Duration) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            dwell,
            free: Mutex::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Whether the backend is idle right now.
    pub fn is_free(&self) -> bool {
        let free = *self.free.lock().unwrap_or_else(|e| e.into_inner());
        tracing::trace!(address = %self.address, free, "Check server");
        free
    }

    pub fn set_free(&self, free: bool) {
        *self.free.lock().unwrap_or_else(|e| e.into_inner()) = free;
    }

    /// Mark busy until the returned guard is dropped.
    pub fn mark_busy(self: &Arc<Self>) -> BusyGuard {
        self.set_free(false);
        BusyGuard {
            backend: self.clone(),
        }
    }

    /// True once the backend's listener has shut down.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Serve on `listener` until `stop` fires, then drain for at most `grace`.
    ///
    /// A dropped stop sender counts as a stop. Exceeding the grace period
    /// abandons the remaining connections and is only logged.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        stop: oneshot::Receiver<()>,
        grace: Duration,
    ) {
        let app = Router::new()
            .fallback(simulate_request)
            .with_state(self.clone());

        let (fired_tx, fired_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.await;
                let _ = fired_tx.send(());
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => {
                if let Err(e) = result {
                    tracing::error!(name = %self.name, error = %e, "Error server runtime");
                }
            }
            _ = fired_rx => {
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(name = %self.name, error = %e, "Error server runtime");
                    }
                    Err(_) => {
                        tracing::warn!(
                            name = %self.name,
                            grace_ms = grace.as_millis() as u64,
                            "Graceful shutdown timed out, forcing stop"
                        );
                    }
                }
            }
        }

        self.stopped.store(true, Ordering::Release);
        tracing::info!(name = %self.name, "Stopped server");
    }
}

/// A RAII guard that flips the backend back to free.
#[derive(Debug)]
pub struct BusyGuard {
    backend: Arc<BackendDescriptor>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.backend.set_free(true);
    }
}

/// Bind a backend's listener and build its descriptor.
///
/// The advertised address uses the port actually bound, so port `0`
/// yields a reachable address.
pub async fn bind(
    config: &ServerConfig,
    dwell: Duration,
) -> std::io::Result<(Arc<BackendDescriptor>, TcpListener)> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    let port = listener.local_addr()?.port();
    let address = format!("http://{}:{}/", config.host, port);
    let descriptor = Arc::new(BackendDescriptor::new(&config.name, address, dwell));
    Ok((descriptor, listener))
}

async fn simulate_request(State(backend): State<Arc<BackendDescriptor>>) -> String {
    tracing::info!(address = %backend.address, "Connected to server");

    let guard = backend.mark_busy();
    tokio::time::sleep(backend.dwell).await;
    drop(guard);

    format!("Server {} answer", backend.address)
}
