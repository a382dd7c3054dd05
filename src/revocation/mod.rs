//! Revocation overlay on top of stateless tokens.
//!
//! Access tokens are blacklisted by identifier until their natural expiry.
//! Refresh tokens are single use (consumed by rotation) and can be invalidated
//! in bulk per identity by bumping a generation counter.

mod guard;
mod memory;

use async_trait::async_trait;

pub use guard::{DEFAULT_STORE_TIMEOUT, FailMode, RevocationGuard};
pub use memory::MemoryRevocationStore;

/// Errors raised by a revocation backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("revocation store error: {0}")]
    Backend(String),
    #[error("revocation store timed out")]
    Timeout,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Shared mutable revocation state, consulted on every authenticated request.
///
/// All timestamps are Unix seconds. Records expire on their own; callers never
/// delete them explicitly.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Blacklist an access token until `expires_at` (its natural expiry).
    async fn blacklist_access(&self, token_id: &str, expires_at: u64) -> Result<(), StoreError>;

    async fn is_access_blacklisted(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Invalidate every refresh token issued to `identity_key` so far.
    /// Returns the new generation.
    async fn invalidate_all_refresh(&self, identity_key: &str) -> Result<u64, StoreError>;

    /// Current refresh generation for an identity (0 if never invalidated).
    async fn refresh_generation(&self, identity_key: &str) -> Result<u64, StoreError>;

    /// Mark a refresh token as used. Atomic check-and-set: returns `true` only
    /// for the caller that performed the transition.
    async fn record_refresh_used(&self, jti: &str, expires_at: u64) -> Result<bool, StoreError>;

    async fn is_refresh_consumed(&self, jti: &str) -> Result<bool, StoreError>;

    /// Drop records whose TTL has passed. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    /// Number of blacklist and consumption records currently held.
    async fn tracked_entries(&self) -> Result<usize, StoreError>;
}
