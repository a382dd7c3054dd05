//! Per-request authenticated context and the extractors that read it.

use axum::{
    extract::FromRequestParts,
    http::{Extensions, request::Parts},
};

use super::errors::Denial;
use crate::identity::{Identity, Role};

/// The authenticated identity attached to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Identity key (email)
    pub identity_key: String,
    /// Database user ID
    pub user_id: i64,
    pub role: Role,
    pub authorities: Vec<String>,
}

impl Principal {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            identity_key: identity.email.clone(),
            user_id: identity.id,
            role: identity.role,
            authorities: vec![identity.role.authority()],
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

/// The access token that authenticated the request, kept so logout can
/// blacklist exactly that token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredential {
    pub token_id: String,
    pub expires_at: u64,
}

/// Attach a principal unless one is already present. Returns whether it was attached.
pub fn install_principal(
    extensions: &mut Extensions,
    principal: Principal,
    credential: PresentedCredential,
) -> bool {
    if extensions.get::<Principal>().is_some() {
        return false;
    }
    extensions.insert(principal);
    extensions.insert(credential);
    true
}

/// Extractor for handlers behind an authenticated rule.
/// Rejects with the 401 envelope if the filter attached no principal.
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Denial;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or(Denial::Unauthenticated)
    }
}

/// Extractor for the presented access token of an authenticated request.
pub struct CurrentCredential(pub PresentedCredential);

impl<S> FromRequestParts<S> for CurrentCredential
where
    S: Send + Sync,
{
    type Rejection = Denial;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PresentedCredential>()
            .cloned()
            .map(CurrentCredential)
            .ok_or(Denial::Unauthenticated)
    }
}
