//! User registration and token management endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use serde::Deserialize;

use crate::error::BalancerError;
use crate::http::server::AppState;
use crate::users::{AuthenticatedUser, CreatedUser, Profile};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeTokensRequest {
    pub capacity: i64,
    pub rate_per_sec: i64,
}

/// `POST /user/create`
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<CreatedUser>, BalancerError> {
    let Json(request) = body.map_err(malformed)?;
    let created = state.users.create_user(&request.name).map_err(|e| {
        tracing::warn!(name = %request.name, error = %e, "User creation rejected");
        e
    })?;
    Ok(Json(created))
}

/// `GET /user/tokens/profile`
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Profile>, BalancerError> {
    Ok(Json(state.users.profile(&user.name)?))
}

/// `POST /user/tokens/change`
pub async fn change_tokens(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<ChangeTokensRequest>, JsonRejection>,
) -> Result<Json<Profile>, BalancerError> {
    let Json(request) = body.map_err(malformed)?;
    let profile = state
        .users
        .change_tokens(&user.name, request.capacity, request.rate_per_sec)
        .map_err(|e| {
            tracing::warn!(user = %user.name, error = %e, "Token change rejected");
            e
        })?;
    Ok(Json(profile))
}

fn malformed(rejection: JsonRejection) -> BalancerError {
    BalancerError::MalformedRequest(rejection.body_text())
}
