pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod identity;
pub mod jwt;
pub mod rate_limit;
pub mod revocation;
pub mod routes;
pub mod session;

use api::{ApiState, create_api_router, default_policy};
use auth::{AccessPolicy, AuthBackend, authentication_filter, authorization_gate, not_found_fallback};
use axum::{Router, middleware};
use clock::Clock;
use identity::IdentityResolver;
use jwt::{JwtConfig, TokenLifetimes};
use rate_limit::RateLimitConfig;
use revocation::{FailMode, RevocationGuard, RevocationStore};
use session::{ReusePolicy, SessionService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Verified-identity lookup (the user database in production)
    pub identities: Arc<dyn IdentityResolver>,
    /// Blacklist, consumed refresh tokens and refresh generations
    pub revocations: Arc<dyn RevocationStore>,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    pub token_lifetimes: TokenLifetimes,
    /// Upper bound on a single revocation store call
    pub store_timeout: Duration,
    /// Upper bound on a single identity lookup
    pub resolver_timeout: Duration,
    pub fail_mode: FailMode,
    pub reuse_policy: ReusePolicy,
    pub login_rate_per_minute: u32,
    pub trust_forwarded_for: bool,
    pub clock: Arc<dyn Clock>,
}

impl ServerConfig {
    pub fn revocation_guard(&self) -> RevocationGuard {
        RevocationGuard::new(self.revocations.clone(), self.store_timeout, self.fail_mode)
    }
}

/// Create the application router with the default access policy.
pub fn create_app(config: &ServerConfig) -> Router {
    create_app_with_policy(config, default_policy())
}

/// Create the application router with a custom access policy.
///
/// The authentication filter is the outermost layer, so every request,
/// including unknown paths, is authenticated once before the authorization
/// gate evaluates the policy.
pub fn create_app_with_policy(config: &ServerConfig, policy: AccessPolicy) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret, config.clock.clone()));
    let revocations = config.revocation_guard();

    let sessions = SessionService::new(
        jwt.clone(),
        revocations.clone(),
        config.identities.clone(),
        config.resolver_timeout,
        config.token_lifetimes,
        config.reuse_policy,
    );

    let rate_limit = Arc::new(RateLimitConfig::new(
        config.login_rate_per_minute,
        config.trust_forwarded_for,
    ));

    let (api_router, routes) = create_api_router(
        ApiState {
            sessions,
            revocations: revocations.clone(),
        },
        rate_limit,
    );

    let backend = AuthBackend {
        jwt,
        revocations,
        identities: config.identities.clone(),
        resolver_timeout: config.resolver_timeout,
        policy: Arc::new(policy),
        routes: Arc::new(routes),
    };

    api_router
        .fallback(not_found_fallback)
        .layer(middleware::from_fn_with_state(
            backend.clone(),
            authorization_gate,
        ))
        .layer(middleware::from_fn_with_state(
            backend,
            authentication_filter,
        ))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let revocations = config.revocation_guard();
    cleanup::run_cleanup(&revocations).await;
    cleanup::spawn_cleanup_scheduler(revocations);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
