//! JWT token generation and validation.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::identity::Role;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token presented on every request
    Access,
    /// Long-lived refresh token, single use
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Unique token id
    pub jti: String,
    /// Subject (identity key, the user's email)
    pub sub: String,
    /// User role
    pub role: Role,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Rotation identifier, consumed on use
    pub jti: String,
    /// Subject (identity key, the user's email)
    pub sub: String,
    /// Refresh generation of the identity when this token was issued
    #[serde(rename = "gen")]
    pub generation: u64,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token lifetime: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Longest lifetime accepted for either token: one year
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Lifetimes used when issuing token pairs.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
        }
    }
}

/// Signing keys and the clock used for expiry checks.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Blacklist identifier for this token
    pub token_id: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// Rotation identifier
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Generate an access token carrying the subject and role.
    pub fn generate_access_token(
        &self,
        identity_key: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = self.clock.now();
        let duration = ttl.as_secs();
        let exp = expiry(now, duration)?;

        let claims = AccessClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: identity_key.to_string(),
            role,
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token_id: token_id(&token),
            token,
            expires_at: exp,
            duration,
        })
    }

    /// Generate a refresh token with a fresh rotation identifier.
    pub fn generate_refresh_token(
        &self,
        identity_key: &str,
        generation: u64,
        ttl: Duration,
    ) -> Result<RefreshTokenResult, JwtError> {
        let now = self.clock.now();
        let duration = ttl.as_secs();
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = expiry(now, duration)?;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: identity_key.to_string(),
            generation,
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = self.decode(token)?;

        if claims.token_type != TokenType::Access {
            return Err(JwtError::Malformed);
        }
        self.check_expiry(claims.exp)?;

        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = self.decode(token)?;

        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::Malformed);
        }
        self.check_expiry(claims.exp)?;

        Ok(claims)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        // Expiry is checked against the injected clock instead of the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from_decode)
    }

    fn check_expiry(&self, exp: u64) -> Result<(), JwtError> {
        if exp <= self.clock.now() {
            return Err(JwtError::Expired);
        }
        Ok(())
    }
}

fn expiry(now: u64, duration: u64) -> Result<u64, JwtError> {
    if duration > MAX_TOKEN_TTL_SECS {
        return Err(JwtError::LifetimeOutOfRange);
    }
    now.checked_add(duration).ok_or(JwtError::LifetimeOutOfRange)
}

/// Stable blacklist identifier for a raw token: base64url(SHA-256(token)).
pub fn token_id(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Error encoding the token
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// Structurally invalid, wrong type, or missing claims
    #[error("malformed token")]
    Malformed,
    /// Signature does not match the signing key
    #[error("token signature is invalid")]
    SignatureInvalid,
    /// Token is past its expiry
    #[error("token has expired")]
    Expired,
    /// Requested lifetime exceeds `MAX_TOKEN_TTL_SECS`
    #[error("token lifetime out of range")]
    LifetimeOutOfRange,
}

impl JwtError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => JwtError::SignatureInvalid,
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Malformed,
        }
    }

    /// Label for logs. Clients never see the distinction.
    pub fn reason(&self) -> &'static str {
        match self {
            JwtError::Encoding(_) => "encoding",
            JwtError::Malformed => "malformed",
            JwtError::SignatureInvalid => "signature_invalid",
            JwtError::Expired => "expired",
            JwtError::LifetimeOutOfRange => "lifetime_out_of_range",
        }
    }
}
