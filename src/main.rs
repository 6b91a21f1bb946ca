//! Cloud balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                    CLOUD BALANCER                     │
//!                     │                                                       │
//!   Client Request    │  ┌──────────┐   ┌───────────┐   ┌───────────────┐    │
//!   ──────────────────┼─▶│  http    │──▶│ security  │──▶│ load_balancer │    │
//!                     │  │ server   │   │ auth+rate │   │  round robin  │    │
//!                     │  └──────────┘   └───────────┘   └───────┬───────┘    │
//!                     │                                         │             │
//!                     │                                         ▼             │
//!   Client Response   │                 ┌───────────┐   ┌───────────────┐    │
//!   ◀─────────────────┼─────────────────│  users    │◀──│  http proxy   │◀───┼── Backend
//!                     │                 │ settle    │   │  handle cache │    │   Simulator
//!                     │                 └───────────┘   └───────────────┘    │
//!                     │                                                       │
//!                     │   lifecycle: startup → signals → drain (refill,      │
//!                     │   backends, front end)                                │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use cloud_balancer::config::{load_config, ProxyConfig};
use cloud_balancer::lifecycle::{self, signals};
use cloud_balancer::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cloud-balancer")]
#[command(about = "Round-robin balancer with per-user token buckets", long_about = None)]
struct Args {
    /// Path to the balancer configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("cloud-balancer v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        servers_file = %config.pool.servers_file.display(),
        refill_interval_ms = config.limiter.refill_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let running = lifecycle::start(config).await?;

    signals::termination().await;
    running.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
