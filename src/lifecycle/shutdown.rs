//! Shutdown coordination for the balancer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::load_balancer::ServerPool;

/// Broadcast trigger that long-running tasks subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the ordered drain: refill, backends, then the front end.
pub struct DrainController {
    refill: Shutdown,
    refill_task: JoinHandle<()>,
    pool: Arc<ServerPool>,
    frontend: Shutdown,
    frontend_timeout: Duration,
}

impl DrainController {
    pub fn new(
        refill: Shutdown,
        refill_task: JoinHandle<()>,
        pool: Arc<ServerPool>,
        frontend: Shutdown,
        frontend_timeout: Duration,
    ) -> Self {
        Self {
            refill,
            refill_task,
            pool,
            frontend,
            frontend_timeout,
        }
    }

    /// Drain everything. Waits on the pool without a deadline and on the
    /// front end for at most the configured timeout; overrunning it is
    /// logged and the server task is abandoned.
    pub async fn drain(self, server: JoinHandle<Result<(), std::io::Error>>) {
        tracing::info!("Drain started");

        self.refill.trigger();
        if let Err(e) = self.refill_task.await {
            tracing::error!(error = %e, "Refill task failed");
        }
        self.pool.close().await;
        self.frontend.trigger();

        let abort = server.abort_handle();
        match tokio::time::timeout(self.frontend_timeout, server).await {
            Ok(Ok(Ok(()))) => tracing::info!("Server shutdown success"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Error server runtime"),
            Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.frontend_timeout.as_millis() as u64,
                    "Error server shutdown: timed out"
                );
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, ServerList};
    use crate::load_balancer::BackendSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);
        shutdown.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn drain_runs_in_order() {
        let order = Arc::new(AtomicUsize::new(0));

        let refill = Shutdown::new();
        let mut refill_rx = refill.subscribe();
        let refill_order = order.clone();
        let refill_done = Arc::new(AtomicUsize::new(usize::MAX));
        let refill_seen = refill_done.clone();
        let refill_task = tokio::spawn(async move {
            let _ = refill_rx.recv().await;
            // Give the drain a chance to run ahead if it does not wait.
            tokio::time::sleep(Duration::from_millis(50)).await;
            refill_seen.store(refill_order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        });

        let list = ServerList {
            servers: vec![ServerConfig {
                name: "only".into(),
                host: "127.0.0.1".into(),
                port: 0,
            }],
        };
        let pool = Arc::new(ServerPool::connect(&list, BackendSettings::default()).await);

        let frontend = Shutdown::new();
        let mut frontend_rx = frontend.subscribe();
        let server_pool = pool.clone();
        let server_order = order.clone();
        let server = tokio::spawn(async move {
            let _ = frontend_rx.recv().await;
            // The pool must already be closed when the front end is told to stop.
            assert!(server_pool.servers().iter().all(|s| s.is_stopped()));
            server_order.fetch_add(1, Ordering::SeqCst);
            Ok::<(), std::io::Error>(())
        });

        DrainController::new(refill, refill_task, pool, frontend, Duration::from_secs(1))
            .drain(server)
            .await;

        // The refill task finished first, before the front end was signalled.
        assert_eq!(refill_done.load(Ordering::SeqCst), 0);
        assert_eq!(order.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stuck_front_end_is_bounded() {
        let pool = Arc::new(ServerPool::from_descriptors(Vec::new()));
        let server = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), std::io::Error>(())
        });

        let started = Instant::now();
        DrainController::new(
            Shutdown::new(),
            tokio::spawn(async {}),
            pool,
            Shutdown::new(),
            Duration::from_millis(100),
        )
        .drain(server)
        .await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
