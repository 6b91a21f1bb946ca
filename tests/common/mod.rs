//! Shared utilities for integration tests.

use std::net::SocketAddr;

use cloud_balancer::config::{ProxyConfig, ServerConfig, ServerList};
use cloud_balancer::lifecycle::{start_with_servers, Running};
use serde_json::{json, Value};

/// Knobs for a test balancer.
#[derive(Clone, Copy)]
pub struct Setup {
    pub servers: usize,
    pub dwell_secs: u64,
    pub refill_interval_ms: u64,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            servers: 2,
            dwell_secs: 0,
            // Long enough that no refill lands mid-test unless asked for.
            refill_interval_ms: 60_000,
        }
    }
}

/// Start a balancer on a free loopback port with `setup.servers` local backends.
pub async fn start_balancer(setup: Setup) -> Running {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.pool.dwell_secs = setup.dwell_secs;
    config.pool.shutdown_grace_secs = 3;
    config.limiter.refill_interval_ms = setup.refill_interval_ms;
    config.timeouts.shutdown_secs = 2;

    let servers = ServerList {
        servers: (0..setup.servers)
            .map(|i| ServerConfig {
                name: format!("server-{i}"),
                host: "127.0.0.1".into(),
                port: 0,
            })
            .collect(),
    };

    start_with_servers(config, servers)
        .await
        .expect("balancer failed to start")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// Register `name` and return its API key.
pub async fn create_user(client: &reqwest::Client, addr: SocketAddr, name: &str) -> String {
    let res = client
        .post(url(addr, "/user/create"))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    body["api_key"].as_str().unwrap().to_string()
}

pub async fn profile(client: &reqwest::Client, addr: SocketAddr, key: &str) -> Value {
    let res = client
        .get(url(addr, "/user/tokens/profile"))
        .header("Authorization", key)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}
