//! Request-path error taxonomy.
//!
//! Every per-request failure maps onto one HTTP status and never
//! crashes the process. Startup failures live in `config::loader`
//! and `users::store` and are fatal before traffic is served.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::users::StoreError;

/// Errors surfaced while admitting, routing, or settling a request.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("Unauthorized")]
    AuthFailure,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("No available servers")]
    NoServerAvailable,

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid tokens data: {0}")]
    InvalidArgument(String),

    #[error("User {0} already exists")]
    UserExists(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl BalancerError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            BalancerError::AuthFailure => StatusCode::UNAUTHORIZED,
            BalancerError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            BalancerError::NoServerAvailable => StatusCode::SERVICE_UNAVAILABLE,
            BalancerError::InvalidTarget(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BalancerError::MalformedRequest(_)
            | BalancerError::InvalidArgument(_)
            | BalancerError::UserExists(_) => StatusCode::BAD_REQUEST,
            BalancerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            BalancerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        // Internal details stay in the logs.
        let body = match &self {
            BalancerError::InvalidTarget(_) => "Invalid target URL".to_string(),
            BalancerError::Persistence(_) => "Token process error".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(BalancerError::AuthFailure.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(BalancerError::RateLimitExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(BalancerError::NoServerAvailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            BalancerError::InvalidTarget("::".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(BalancerError::UserExists("bob".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(BalancerError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
    }

    async fn body_json(error: BalancerError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_target_hides_details() {
        let (status, body) = body_json(BalancerError::InvalidTarget("secret-host".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Invalid target URL" }));
    }

    #[tokio::test]
    async fn errors_render_as_json() {
        let (status, body) = body_json(BalancerError::RateLimitExceeded).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({ "error": "Rate limit exceeded" }));
    }
}
