//! Session endpoints.
//!
//! - POST `/api/auth/login` - Exchange email + password for a token pair
//! - POST `/api/auth/refresh` - Rotate a refresh token
//! - POST `/api/auth/logout` - Revoke the presented access token (and refresh token)
//! - POST `/api/auth/logout-all` - Invalidate every refresh token of the caller
//! - GET `/api/auth/me` - Describe the authenticated principal

use axum::{body::Bytes, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::error::{ApiError, ApiJson, ApiResponse};
use crate::auth::{Authenticated, CurrentCredential};
use crate::identity::Role;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    email: String,
    user_id: i64,
    role: Role,
    authorities: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutAllResponse {
    refresh_generation: u64,
}

pub async fn login(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let pair = state
        .sessions
        .login(body.email.trim(), &body.password)
        .await?;
    Ok(ApiResponse::ok(pair))
}

pub async fn refresh(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.sessions.rotate(&body.refresh_token).await?;
    Ok(ApiResponse::ok(pair))
}

/// The body is optional; when present it may carry the refresh token to consume.
pub async fn logout(
    State(state): State<ApiState>,
    Authenticated(principal): Authenticated,
    CurrentCredential(credential): CurrentCredential,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid request body"))?
    };

    state
        .sessions
        .logout(&principal, &credential, request.refresh_token.as_deref())
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({})))
}

pub async fn logout_all(
    State(state): State<ApiState>,
    Authenticated(principal): Authenticated,
    CurrentCredential(credential): CurrentCredential,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_generation = state
        .sessions
        .logout_all(&principal.identity_key, Some(&credential))
        .await?;

    Ok(ApiResponse::ok(LogoutAllResponse { refresh_generation }))
}

pub async fn me(Authenticated(principal): Authenticated) -> impl IntoResponse {
    ApiResponse::ok(MeResponse {
        email: principal.identity_key,
        user_id: principal.user_id,
        role: principal.role,
        authorities: principal.authorities,
    })
}
