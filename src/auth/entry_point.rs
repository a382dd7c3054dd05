//! Authorization gate and denial disambiguation.
//!
//! Runs after the authentication filter. When the access policy refuses a
//! request it decides which denial the client sees:
//! - no principal, no handler for the method and path: 404
//! - no principal, handler exists: 401
//! - principal present, missing role: 403 (no route probe)

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::errors::Denial;
use super::policy::Decision;
use super::principal::Principal;
use super::state::AuthBackend;
use crate::routes::RouteRegistry;

/// Choose between 404 and 401 for an unauthenticated denial.
pub fn disambiguate(routes: &RouteRegistry, method: &Method, path: &str) -> Denial {
    if routes.has_handler(method, path) {
        Denial::Unauthenticated
    } else {
        Denial::NotFound
    }
}

pub async fn authorization_gate(
    State(backend): State<AuthBackend>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let principal = request.extensions().get::<Principal>();

    match backend.policy.evaluate(&method, &path, principal) {
        Decision::Allow => next.run(request).await,
        Decision::Unauthenticated => {
            let denial = disambiguate(&backend.routes, &method, &path);
            debug!(%method, path = %path, status = %denial.status_code(), "Unauthenticated request denied");
            denial.into_response()
        }
        Decision::Forbidden => {
            debug!(%method, path = %path, "Principal lacks required role");
            Denial::Forbidden.into_response()
        }
    }
}

/// Router fallback for permitted paths with no handler.
pub async fn not_found_fallback() -> Response {
    Denial::NotFound.into_response()
}
