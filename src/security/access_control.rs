//! API key authentication middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::BalancerError;
use crate::users::UserStore;

/// Resolve the `Authorization` header to a user and attach it to the request.
///
/// The header carries the raw API key; a `Bearer ` prefix is tolerated.
pub async fn user_auth_middleware(
    State(store): State<Arc<UserStore>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let api_key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .unwrap_or_default();

    if api_key.is_empty() {
        tracing::debug!("Missing Authorization header");
        return BalancerError::AuthFailure.into_response();
    }

    match store.authenticate(api_key) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("Rejected unknown API key");
            e.into_response()
        }
    }
}
