//! Forwarding handles and the per-target handle cache.
//!
//! # Responsibilities
//! - Parse a backend address into a forwarding handle
//! - Cache one handle per distinct target string, never evicted
//! - Relay a request to the target and stream the response back
//!
//! # Design Decisions
//! - Lookup-or-insert runs under a single lock, so a target never gets two handles
//! - All handles share one pooled HTTP client
//! - Original headers are forwarded, minus hop-by-hop headers and `Host`

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderName, Request, Response, Uri, Version,
    },
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::error::BalancerError;

pub type HttpClient = Client<HttpConnector, Body>;

/// Headers that describe a single hop and must not be relayed.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A reusable handle that rewrites requests onto one target.
#[derive(Debug)]
pub struct ForwardingHandle {
    target: Url,
    scheme: Scheme,
    authority: Authority,
    client: HttpClient,
}

impl ForwardingHandle {
    /// Parse `target` and build a handle for it.
    pub fn new(target: &str, client: HttpClient) -> Result<Self, BalancerError> {
        let invalid = |reason: String| BalancerError::InvalidTarget(format!("{target}: {reason}"));

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host".into()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            target: url,
            scheme: Scheme::HTTP,
            authority,
            client,
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Send `request` to the target, keeping its method, path, query, headers and body.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, BalancerError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        parts.uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| BalancerError::InvalidTarget(e.to_string()))?;
        parts.version = Version::HTTP_11;

        for name in &HOP_BY_HOP {
            parts.headers.remove(name);
        }
        parts.headers.remove("keep-alive");
        parts.headers.remove(header::HOST);

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| BalancerError::Upstream(e.to_string()))?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Target string -> forwarding handle.
#[derive(Debug)]
pub struct ProxyCache {
    client: HttpClient,
    cached: Mutex<HashMap<String, Arc<ForwardingHandle>>>,
}

impl ProxyCache {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(client)
    }

    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Cached handle for `target`, building and caching it on first use.
    ///
    /// An unparsable target returns an error and leaves the cache untouched.
    pub fn get(&self, target: &str) -> Result<Arc<ForwardingHandle>, BalancerError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = cached.get(target) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(ForwardingHandle::new(target, self.client.clone())?);
        cached.insert(target.to_string(), handle.clone());
        tracing::debug!(target = %target, "Cached new forwarding handle");
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.cached.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}
