//! Single-use refresh token rotation.
//!
//! A refresh token is Issued until one of: Consumed (rotated or logged out),
//! Expired, or Invalidated (its generation is older than the identity's).
//! Marking a token consumed is an atomic check-and-set in the store, so of
//! several concurrent rotations of one token exactly one succeeds.

use tracing::{debug, warn};

use super::{ReusePolicy, SessionService, TokenPair};
use crate::identity::ResolverError;
use crate::jwt::JwtError;
use crate::revocation::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token invalid")]
    Invalid,
    #[error("refresh token already used")]
    Reused,
    #[error("refresh token invalidated by logout-all")]
    Invalidated,
    #[error("revocation store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("identity lookup failed: {0}")]
    ResolverUnavailable(#[from] ResolverError),
    #[error("failed to issue token: {0}")]
    Issue(JwtError),
}

impl RotationError {
    /// The client must log in again rather than retry.
    pub fn requires_login(&self) -> bool {
        matches!(self, RotationError::Reused | RotationError::Invalidated)
    }
}

impl SessionService {
    /// Exchange a refresh token for a new access + refresh pair.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, RotationError> {
        let claims = self.jwt.validate_refresh_token(refresh_token).map_err(|e| {
            debug!(reason = e.reason(), "Refresh token rejected");
            match e {
                JwtError::Expired => RotationError::Expired,
                _ => RotationError::Invalid,
            }
        })?;

        let current = self.revocations.refresh_generation(&claims.sub).await?;
        if claims.generation < current {
            debug!(identity = %claims.sub, "Refresh token predates logout-all");
            return Err(RotationError::Invalidated);
        }

        if !self
            .revocations
            .record_refresh_used(&claims.jti, claims.exp)
            .await?
        {
            warn!(identity = %claims.sub, jti = %claims.jti, "Refresh token reuse detected");
            if self.reuse_policy == ReusePolicy::RevokeChain {
                match self.revocations.invalidate_all_refresh(&claims.sub).await {
                    Ok(generation) => {
                        warn!(identity = %claims.sub, generation, "Revoked refresh chain after reuse")
                    }
                    Err(e) => warn!(error = %e, "Failed to revoke refresh chain after reuse"),
                }
            }
            return Err(RotationError::Reused);
        }

        // Role or verification may have changed since the token was issued.
        let identity = self
            .resolve(&claims.sub)
            .await?
            .ok_or(RotationError::Invalid)?;

        self.issue_pair_at(&identity, current)
            .map_err(RotationError::Issue)
    }
}
