//! Startup orchestration.
//!
//! Fail fast: a store or server-list error stops the process before any
//! traffic is served. Listeners start last.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{load_servers, ConfigError, ProxyConfig, ServerList};
use crate::http::{AppState, HttpServer, ProxyCache};
use crate::lifecycle::shutdown::{DrainController, Shutdown};
use crate::load_balancer::{BackendSettings, ServerPool};
use crate::security::rate_limit;
use crate::users::{StoreError, UserStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("error connection to servers: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open user store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind front end: {0}")]
    Bind(#[from] std::io::Error),
}

/// A started balancer.
pub struct Running {
    pub local_addr: SocketAddr,
    pub users: Arc<UserStore>,
    pub pool: Arc<ServerPool>,
    server: JoinHandle<Result<(), std::io::Error>>,
    drain: DrainController,
}

impl Running {
    /// Drain backends and the front end, then persist users.
    pub async fn shutdown(self) {
        self.drain.drain(self.server).await;
        if let Err(e) = self.users.save() {
            tracing::error!(error = %e, "Failed to save users");
        }
    }
}

/// Start using the servers file named in the configuration.
pub async fn start(config: ProxyConfig) -> Result<Running, StartupError> {
    let servers = load_servers(&config.pool.servers_file)?;
    start_with_servers(config, servers).await
}

/// Start with an explicit server list.
pub async fn start_with_servers(
    config: ProxyConfig,
    servers: ServerList,
) -> Result<Running, StartupError> {
    let users = Arc::new(UserStore::open(&config.store, &config.limiter)?);

    let pool = Arc::new(ServerPool::connect(&servers, BackendSettings::from(&config.pool)).await);

    let refill = Shutdown::new();
    let refill_task = tokio::spawn(rate_limit::run_refill(
        users.clone(),
        config.limiter.refill_interval(),
        refill.subscribe(),
    ));

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            refill.trigger();
            let _ = refill_task.await;
            pool.close().await;
            return Err(e.into());
        }
    };
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Running server");

    let state = AppState {
        users: users.clone(),
        balancer: pool.clone(),
        proxies: Arc::new(ProxyCache::new()),
    };
    let frontend = Shutdown::new();
    let server = HttpServer::new(&config, state);
    let server = tokio::spawn(server.run(listener, frontend.subscribe()));

    let drain = DrainController::new(
        refill,
        refill_task,
        pool.clone(),
        frontend,
        config.timeouts.shutdown(),
    );

    Ok(Running {
        local_addr,
        users,
        pool,
        server,
        drain,
    })
}
