mod admin;
mod auth;
mod error;

use axum::{Json, Router, http::Method, middleware, response::IntoResponse, routing::{get, post}};
use std::sync::Arc;

use crate::auth::AccessPolicy;
use crate::identity::Role;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};
use crate::revocation::RevocationGuard;
use crate::routes::{RouteRegistry, RouteTable};
use crate::session::SessionService;

pub use error::{ApiError, ApiResponse, ResultExt};

/// State shared by every API handler.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionService,
    pub revocations: RevocationGuard,
}

/// Access rules for the API, evaluated top to bottom.
pub fn default_policy() -> AccessPolicy {
    AccessPolicy::new()
        .permit(Method::GET, "/api/health")
        .permit(Method::POST, "/api/auth/login")
        .permit(Method::POST, "/api/auth/refresh")
        .has_role("/api/admin/**", Role::Admin)
        .authenticated("/api/**")
}

/// Create the API router and the registry of everything it serves.
pub fn create_api_router(
    state: ApiState,
    rate_limit: Arc<RateLimitConfig>,
) -> (Router, RouteRegistry) {
    let limited = middleware::from_fn_with_state(rate_limit, rate_limit_auth);

    let (router, registry) = RouteTable::new()
        .get("/api/health", get(health))
        .post("/api/auth/login", post(auth::login).layer(limited.clone()))
        .post("/api/auth/refresh", post(auth::refresh).layer(limited))
        .post("/api/auth/logout", post(auth::logout))
        .post("/api/auth/logout-all", post(auth::logout_all))
        .get("/api/auth/me", get(auth::me))
        .post(
            "/api/admin/users/{email}/logout-all",
            post(admin::force_logout_all),
        )
        .get("/api/admin/revocations", get(admin::revocation_stats))
        .into_parts();

    (router.with_state(state), registry)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
