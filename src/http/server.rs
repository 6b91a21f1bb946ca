//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, authentication)
//! - Run the admission pipeline for balanced requests
//! - Serve until the front-end shutdown signal fires

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::BalancerError;
use crate::http::{proxy::ProxyCache, request, users};
use crate::load_balancer::Balancer;
use crate::observability::metrics;
use crate::security::access_control::user_auth_middleware;
use crate::users::{AuthenticatedUser, UserStore};

/// Set on a proxied response whose token could not be consumed afterwards.
pub const X_TOKEN_SETTLEMENT: &str = "x-token-settlement";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub balancer: Arc<dyn Balancer>,
    pub proxies: Arc<ProxyCache>,
}

/// HTTP front end for the balancer.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ProxyConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let authenticated = Router::new()
            .route("/user/tokens/profile", get(users::get_profile))
            .route("/user/tokens/change", post(users::change_tokens))
            .route("/", get(balance_handler))
            .route("/{*path}", get(balance_handler))
            .route_layer(middleware::from_fn_with_state(
                state.users.clone(),
                user_auth_middleware,
            ));

        Router::new()
            .route("/user/create", post(users::create_user))
            .merge(authenticated)
            .with_state(state)
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(request::request_id_layers())
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Balanced request: admit, route, forward, settle.
async fn balance_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    request: Request<Body>,
) -> Response {
    let request_id = request::request_id(&request).to_string();

    // Identified -> Admitted
    if let Err(e) = state.users.check_can_request(&user.name) {
        tracing::warn!(request_id = %request_id, user = %user.name, "Rate limit exceeded");
        metrics::record_request("rate_limited");
        return e.into_response();
    }

    // Admitted -> Routed
    let Some(target) = state.balancer.redirect() else {
        tracing::warn!(request_id = %request_id, "No available servers");
        metrics::record_request("no_server");
        return BalancerError::NoServerAvailable.into_response();
    };
    tracing::info!(request_id = %request_id, target = %target, "Redirect");

    // Routed -> Forwarded
    let handle = match state.proxies.get(&target) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Invalid target URL");
            metrics::record_request("invalid_target");
            return e.into_response();
        }
    };
    let (mut response, outcome) = match handle.forward(request).await {
        Ok(response) => (response, "forwarded"),
        Err(e) => {
            tracing::error!(request_id = %request_id, target = %target, error = %e, "Upstream error");
            (e.into_response(), "upstream_error")
        }
    };

    // Forwarded -> Settled; the response already exists and is never retracted.
    if let Err(e) = state.users.request_done(&user.name) {
        tracing::error!(request_id = %request_id, user = %user.name, error = %e, "Token process error");
        response
            .headers_mut()
            .insert(X_TOKEN_SETTLEMENT, HeaderValue::from_static("failed"));
    }

    metrics::record_request(outcome);
    response
}
