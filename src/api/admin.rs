//! Admin API endpoints. The access policy restricts `/api/admin/**` to ADMIN.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;

use super::ApiState;
use super::error::{ApiError, ApiResponse, ResultExt};
use crate::auth::Authenticated;
use crate::revocation::FailMode;
use crate::session::ReusePolicy;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForcedLogoutResponse {
    email: String,
    refresh_generation: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RevocationStats {
    tracked_entries: usize,
    fail_mode: &'static str,
    reuse_policy: &'static str,
}

/// Invalidate every refresh token of another identity.
pub async fn force_logout_all(
    State(state): State<ApiState>,
    Authenticated(admin): Authenticated,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Tokens carry the stored email, so look up its canonical form.
    let identity = state
        .sessions
        .resolve(&email)
        .await
        .store_err("Failed to look up identity")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let refresh_generation = state.sessions.logout_all(&identity.email, None).await?;
    info!(admin = %admin.identity_key, target = %identity.email, "Forced logout-all");

    Ok(ApiResponse::ok(ForcedLogoutResponse {
        email: identity.email,
        refresh_generation,
    }))
}

pub async fn revocation_stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let tracked_entries = state
        .revocations
        .tracked_entries()
        .await
        .store_err("Failed to read revocation store")?;

    Ok(ApiResponse::ok(RevocationStats {
        tracked_entries,
        fail_mode: match state.revocations.fail_mode() {
            FailMode::Closed => "closed",
            FailMode::Open => "open",
        },
        reuse_policy: match state.sessions.reuse_policy() {
            ReusePolicy::RevokeChain => "revoke-chain",
            ReusePolicy::Reject => "reject",
        },
    }))
}
