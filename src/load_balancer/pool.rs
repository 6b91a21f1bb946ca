//! Backend pool management.
//!
//! # Responsibilities
//! - Parse the server list and start one backend task per entry
//! - Own each backend's stop signal
//! - Apply the round-robin policy to the ordered descriptors
//! - Close: fire every stop signal, then wait for every backend task

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::config::{load_servers, ConfigError, ServerList};
use crate::load_balancer::{
    backend::{self, BackendDescriptor, BackendSettings},
    round_robin::RoundRobin,
    Balancer,
};

/// An ordered set of backends plus the round-robin cursor.
#[derive(Debug)]
pub struct ServerPool {
    servers: Vec<Arc<BackendDescriptor>>,
    policy: RoundRobin,
    stops: Mutex<Vec<oneshot::Sender<()>>>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl ServerPool {
    /// Read the server list at `source` and start its backends.
    pub async fn connect_to_servers(
        source: &Path,
        settings: BackendSettings,
    ) -> Result<Self, ConfigError> {
        let list = load_servers(source)?;
        Ok(Self::connect(&list, settings).await)
    }

    /// Start one backend per entry, each on its own task.
    ///
    /// A backend whose listener cannot be bound keeps its slot in the
    /// rotation but never runs; the failure is logged.
    pub async fn connect(list: &ServerList, settings: BackendSettings) -> Self {
        let mut servers = Vec::with_capacity(list.servers.len());
        let mut stops = Vec::with_capacity(list.servers.len());
        let mut tasks = JoinSet::new();

        tracing::info!(count = list.servers.len(), "Connecting to servers");
        for config in &list.servers {
            match backend::bind(config, settings.dwell).await {
                Ok((descriptor, listener)) => {
                    let (stop_tx, stop_rx) = oneshot::channel();
                    tracing::info!(
                        name = %config.name,
                        host = %config.host,
                        address = %descriptor.address,
                        "Backend started"
                    );
                    tasks.spawn(descriptor.clone().serve(
                        listener,
                        stop_rx,
                        settings.shutdown_grace,
                    ));
                    stops.push(stop_tx);
                    servers.push(descriptor);
                }
                Err(e) => {
                    tracing::error!(
                        name = %config.name,
                        address = %config.bind_address(),
                        error = %e,
                        "Failed to start backend listener"
                    );
                    let address = format!("http://{}:{}/", config.host, config.port);
                    servers.push(Arc::new(BackendDescriptor::new(
                        &config.name,
                        address,
                        settings.dwell,
                    )));
                }
            }
        }

        Self {
            servers,
            policy: RoundRobin::new(),
            stops: Mutex::new(stops),
            tasks: tokio::sync::Mutex::new(tasks),
        }
    }

    /// A pool over descriptors that have no running backend behind them.
    pub fn from_descriptors(servers: Vec<Arc<BackendDescriptor>>) -> Self {
        Self {
            servers,
            policy: RoundRobin::new(),
            stops: Mutex::new(Vec::new()),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn servers(&self) -> &[Arc<BackendDescriptor>] {
        &self.servers
    }

    /// Current round-robin cursor position.
    pub fn cursor(&self) -> usize {
        self.policy.cursor()
    }

    /// Signal every backend to stop and wait until all of them have.
    ///
    /// There is no overall deadline: each backend bounds its own shutdown.
    /// Calling this again after it returned does nothing.
    pub async fn close(&self) {
        tracing::info!("Closing started");

        let stops = std::mem::take(&mut *self.stops.lock().unwrap_or_else(|e| e.into_inner()));
        for stop in stops {
            let _ = stop.send(());
        }

        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Backend task failed");
            }
        }

        tracing::info!("Closing done");
    }
}

impl Balancer for ServerPool {
    fn redirect(&self) -> Option<String> {
        self.policy.next_server(&self.servers)
    }
}
