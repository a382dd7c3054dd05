//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use crate::ServerConfig;
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::identity::Role;
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, MAX_TOKEN_TTL_SECS, REFRESH_TOKEN_DURATION_SECS, TokenLifetimes,
};
use crate::rate_limit::DEFAULT_AUTH_REQUESTS_PER_MINUTE;
use crate::revocation::{FailMode, MemoryRevocationStore, RevocationStore};
use crate::session::ReusePolicy;
use clap::Parser;
use tracing::{error, info, warn};

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ADMIN_PASSWORD_LENGTH: usize = 12;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Where revocation records live.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process memory. Revocations are lost on restart.
    Memory,
    /// The SQLite database. Revocations survive restarts.
    #[default]
    Sqlite,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Tollgate",
    about = "Bearer-token authentication with logout and refresh rotation"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tollgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS)
    )]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS)
    )]
    pub refresh_ttl_secs: u64,

    /// Revocation store backend
    #[arg(long, value_enum, default_value = "sqlite")]
    pub revocation_store: StoreBackend,

    /// Upper bound on a single revocation store call, in milliseconds
    #[arg(long, default_value = "250")]
    pub store_timeout_ms: u64,

    /// Upper bound on a single identity lookup, in milliseconds
    #[arg(long, default_value = "1000")]
    pub resolver_timeout_ms: u64,

    /// Behaviour when the blacklist cannot be read. `open` accepts possibly revoked tokens
    #[arg(long, value_enum, default_value = "closed")]
    pub fail_mode: FailMode,

    /// Behaviour when a consumed refresh token is presented again
    #[arg(long, value_enum, default_value = "revoke-chain")]
    pub reuse_policy: ReusePolicy,

    /// Login and refresh attempts allowed per client IP per minute
    #[arg(long, default_value_t = DEFAULT_AUTH_REQUESTS_PER_MINUTE)]
    pub login_rate_per_minute: u32,

    /// Rate limit on the first X-Forwarded-For address (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Create or promote a verified admin with this email. New accounts take
    /// their password from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: called during startup before the runtime spawns any task
        // that reads the environment.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Handle --create-admin: promote an existing user or create a new verified admin.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let users = db.users();

    match users.get_by_email(email).await {
        Ok(Some(existing)) => {
            let promoted = match users.set_role(existing.id, Role::Admin).await {
                Ok(_) => users.mark_verified(existing.id).await,
                Err(e) => Err(e),
            };
            if let Err(e) = promoted {
                error!(error = %e, "Failed to promote admin user");
                std::process::exit(1);
            }
            println!();
            println!("Existing user promoted to admin: {}", existing.email);
            println!();
        }
        Ok(None) => {
            let password = match std::env::var("ADMIN_PASSWORD") {
                Ok(password) if password.len() >= MIN_ADMIN_PASSWORD_LENGTH => password,
                Ok(_) => {
                    error!(
                        "ADMIN_PASSWORD must be at least {} characters",
                        MIN_ADMIN_PASSWORD_LENGTH
                    );
                    std::process::exit(1);
                }
                Err(_) => {
                    error!("ADMIN_PASSWORD is required to create a new admin");
                    std::process::exit(1);
                }
            };
            // SAFETY: startup, see load_jwt_secret.
            unsafe { std::env::remove_var("ADMIN_PASSWORD") };

            let hash = match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };

            let created = match users.create(email, &hash, Role::Admin).await {
                Ok(id) => users.mark_verified(id).await,
                Err(e) => Err(e),
            };
            if let Err(e) = created {
                error!(error = %e, "Failed to create admin user");
                std::process::exit(1);
            }
            println!();
            println!("Admin user created: {}", email);
            println!();
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let revocations: Arc<dyn RevocationStore> = match args.revocation_store {
        StoreBackend::Sqlite => Arc::new(db.revocations(clock.clone())),
        StoreBackend::Memory => {
            warn!("Using in-memory revocation store; logouts do not survive a restart");
            Arc::new(MemoryRevocationStore::new(clock.clone()))
        }
    };

    if args.fail_mode == FailMode::Open {
        warn!("Revocation fail mode is OPEN: revoked tokens are accepted while the store is unreachable");
    }

    ServerConfig {
        identities: Arc::new(db),
        revocations,
        jwt_secret: jwt_secret.into_bytes(),
        token_lifetimes: TokenLifetimes {
            access: Duration::from_secs(args.access_ttl_secs),
            refresh: Duration::from_secs(args.refresh_ttl_secs),
        },
        store_timeout: Duration::from_millis(args.store_timeout_ms),
        resolver_timeout: Duration::from_millis(args.resolver_timeout_ms),
        fail_mode: args.fail_mode,
        reuse_policy: args.reuse_policy,
        login_rate_per_minute: args.login_rate_per_minute,
        trust_forwarded_for: args.trust_forwarded_for,
        clock,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
