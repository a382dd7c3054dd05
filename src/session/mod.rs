//! Session operations: login, refresh rotation, logout and logout-all.
//!
//! Sessions are never stored. A session is an access token plus a refresh
//! token; ending one means blacklisting the access token and consuming or
//! generation-invalidating the refresh token.

mod rotation;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

pub use rotation::RotationError;

use crate::auth::{PresentedCredential, Principal};
use crate::identity::{Identity, IdentityResolver, ResolverError};
use crate::jwt::{JwtConfig, JwtError, TokenLifetimes};
use crate::revocation::{RevocationGuard, StoreError};

/// What a rotation does when it sees a refresh token that was already consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReusePolicy {
    /// Reject and bump the identity's refresh generation, killing every
    /// outstanding refresh token in the chain.
    #[default]
    RevokeChain,
    /// Reject the replayed token only.
    Reject,
}

/// Access and refresh token handed to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub access_expires_at: u64,
    pub refresh_expires_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Unknown email, unverified email, or wrong password. Never distinguished.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("revocation store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("identity lookup failed: {0}")]
    Resolver(#[from] ResolverError),
    #[error("failed to issue token: {0}")]
    Issue(#[from] JwtError),
}

#[derive(Clone)]
pub struct SessionService {
    jwt: Arc<JwtConfig>,
    revocations: RevocationGuard,
    identities: Arc<dyn IdentityResolver>,
    resolver_timeout: Duration,
    lifetimes: TokenLifetimes,
    reuse_policy: ReusePolicy,
}

impl SessionService {
    pub fn new(
        jwt: Arc<JwtConfig>,
        revocations: RevocationGuard,
        identities: Arc<dyn IdentityResolver>,
        resolver_timeout: Duration,
        lifetimes: TokenLifetimes,
        reuse_policy: ReusePolicy,
    ) -> Self {
        Self {
            jwt,
            revocations,
            identities,
            resolver_timeout,
            lifetimes,
            reuse_policy,
        }
    }

    pub fn reuse_policy(&self) -> ReusePolicy {
        self.reuse_policy
    }

    /// Check the password of a verified identity and issue a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let identity = self
            .resolve(email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        let password = password.to_string();
        let hash = identity.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ResolverError::Backend(format!("password check aborted: {}", e)))?;

        match matches {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::InvalidCredentials),
            Err(e) => {
                debug!(error = %e, "Stored password hash could not be checked");
                return Err(SessionError::InvalidCredentials);
            }
        }

        let pair = self.issue_pair(&identity).await?;
        info!(identity = %identity.email, "Login succeeded");
        Ok(pair)
    }

    /// Issue a pair at the identity's current refresh generation.
    pub async fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, SessionError> {
        let generation = self.revocations.refresh_generation(&identity.email).await?;
        Ok(self.issue_pair_at(identity, generation)?)
    }

    fn issue_pair_at(&self, identity: &Identity, generation: u64) -> Result<TokenPair, JwtError> {
        let access =
            self.jwt
                .generate_access_token(&identity.email, identity.role, self.lifetimes.access)?;
        let refresh =
            self.jwt
                .generate_refresh_token(&identity.email, generation, self.lifetimes.refresh)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer",
            expires_in: access.duration,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// End the current session.
    ///
    /// The presented access token is blacklisted until its natural expiry. A
    /// refresh token, when supplied and owned by the same principal, is
    /// consumed so it cannot be rotated. An unusable refresh token is ignored.
    pub async fn logout(
        &self,
        principal: &Principal,
        credential: &PresentedCredential,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        self.revocations
            .blacklist_access(&credential.token_id, credential.expires_at)
            .await?;

        if let Some(token) = refresh_token {
            match self.jwt.validate_refresh_token(token) {
                Ok(claims) if claims.sub == principal.identity_key => {
                    self.revocations
                        .record_refresh_used(&claims.jti, claims.exp)
                        .await?;
                }
                Ok(_) => debug!("Ignoring refresh token of another identity on logout"),
                Err(e) => debug!(reason = e.reason(), "Ignoring unusable refresh token on logout"),
            }
        }

        info!(identity = %principal.identity_key, "Logged out");
        Ok(())
    }

    /// Invalidate every refresh token issued to `identity_key` so far.
    ///
    /// Access tokens already issued on other devices stay valid until they
    /// expire. The caller's own access token, when given, is blacklisted.
    /// Returns the new refresh generation.
    pub async fn logout_all(
        &self,
        identity_key: &str,
        credential: Option<&PresentedCredential>,
    ) -> Result<u64, SessionError> {
        let generation = self.revocations.invalidate_all_refresh(identity_key).await?;

        if let Some(credential) = credential {
            self.revocations
                .blacklist_access(&credential.token_id, credential.expires_at)
                .await?;
        }

        info!(identity = %identity_key, generation, "Invalidated all refresh tokens");
        Ok(generation)
    }

    /// Verified identity by email, bounded by the resolver timeout.
    pub async fn resolve(&self, email: &str) -> Result<Option<Identity>, ResolverError> {
        match tokio::time::timeout(
            self.resolver_timeout,
            self.identities.find_by_verified_email(email),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ResolverError::Timeout),
        }
    }
}
