//! Identity records and the resolver capability consumed by authentication.
//!
//! Storage of users belongs to the user-management side; authentication only
//! needs to look an identity up by email, and only when the email is verified.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role attached to an identity and carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }

    /// Parse a stored role name. Unknown names fall back to the least privileged role.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            _ => Role::Customer,
        }
    }

    /// Authority string derived from the role, e.g. `ROLE_ADMIN`.
    pub fn authority(&self) -> String {
        format!("ROLE_{}", self.as_str())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user record as owned by the user-management collaborator.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
}

/// Failure talking to the identity backend. "Not found" is `Ok(None)`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("identity backend error: {0}")]
    Backend(String),
    #[error("identity lookup timed out")]
    Timeout,
}

/// Lookup of identities by email, restricted to verified emails.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn find_by_verified_email(&self, email: &str)
    -> Result<Option<Identity>, ResolverError>;
}
