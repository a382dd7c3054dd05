//! Rate limiting for credential-accepting endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and refresh token stuffing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

use crate::auth::{ErrorEnvelope, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default login/refresh attempts per IP per minute.
pub const DEFAULT_AUTH_REQUESTS_PER_MINUTE: u32 = 30;

/// Key used when no client address can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct RateLimitConfig {
    /// Shared by login and refresh
    pub auth: Arc<IpLimiter>,
    /// Key on the left-most `X-Forwarded-For` entry instead of the peer address
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// `per_minute` of zero is treated as one.
    pub fn new(per_minute: u32, trust_forwarded_for: bool) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            auth: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            trust_forwarded_for,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_REQUESTS_PER_MINUTE, false)
    }
}

/// Middleware for rate limiting login and refresh.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.trust_forwarded_for).unwrap_or_else(|reason| {
        debug!(reason, "Client IP unavailable, using shared bucket");
        UNKNOWN_CLIENT.to_string()
    });

    match config.auth.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Authentication rate limit exceeded");
            ErrorEnvelope::new(
                "Too many authentication attempts. Please wait before trying again.",
                "TOO_MANY_REQUESTS",
            )
            .into_response_with(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}
