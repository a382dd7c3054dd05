//! Per-request authentication filter.
//!
//! Runs once per request before authorization. It either installs a
//! [`Principal`] or leaves the request unauthenticated; it never writes the
//! rejection response itself.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::bearer::bearer_token;
use super::principal::{Principal, PresentedCredential, install_principal};
use super::state::AuthBackend;
use crate::jwt::{JwtError, token_id};

/// Why a presented credential was not accepted. Logged, never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    Malformed,
    SignatureInvalid,
    Expired,
    Revoked,
    IdentityNotFound,
    StoreUnavailable,
    ResolverUnavailable,
}

impl CredentialFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            CredentialFailure::Malformed => "malformed",
            CredentialFailure::SignatureInvalid => "signature_invalid",
            CredentialFailure::Expired => "expired",
            CredentialFailure::Revoked => "revoked",
            CredentialFailure::IdentityNotFound => "identity_not_found",
            CredentialFailure::StoreUnavailable => "store_unavailable",
            CredentialFailure::ResolverUnavailable => "resolver_unavailable",
        }
    }
}

impl From<JwtError> for CredentialFailure {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::SignatureInvalid => CredentialFailure::SignatureInvalid,
            JwtError::Expired => CredentialFailure::Expired,
            JwtError::Malformed | JwtError::Encoding(_) | JwtError::LifetimeOutOfRange => {
                CredentialFailure::Malformed
            }
        }
    }
}

/// Terminal state of the filter for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// No bearer credential was presented.
    NoCredential,
    /// A credential was presented and refused. Downstream treats this like `NoCredential`.
    Rejected(CredentialFailure),
    Authenticated(Principal, PresentedCredential),
}

/// Evaluate the credential in `headers` without touching the request.
pub async fn authenticate(backend: &AuthBackend, headers: &HeaderMap) -> FilterOutcome {
    let Some(token) = bearer_token(headers) else {
        return FilterOutcome::NoCredential;
    };

    let id = token_id(token);
    match backend.revocations.check_access(&id).await {
        Ok(false) => {}
        Ok(true) => return FilterOutcome::Rejected(CredentialFailure::Revoked),
        Err(_) => return FilterOutcome::Rejected(CredentialFailure::StoreUnavailable),
    }

    let claims = match backend.jwt.validate_access_token(token) {
        Ok(claims) => claims,
        Err(e) => return FilterOutcome::Rejected(e.into()),
    };

    let lookup = tokio::time::timeout(
        backend.resolver_timeout,
        backend.identities.find_by_verified_email(&claims.sub),
    )
    .await;

    let identity = match lookup {
        Ok(Ok(Some(identity))) => identity,
        Ok(Ok(None)) => return FilterOutcome::Rejected(CredentialFailure::IdentityNotFound),
        Ok(Err(e)) => {
            warn!(error = %e, "Identity lookup failed");
            return FilterOutcome::Rejected(CredentialFailure::ResolverUnavailable);
        }
        Err(_) => {
            warn!("Identity lookup timed out");
            return FilterOutcome::Rejected(CredentialFailure::ResolverUnavailable);
        }
    };

    FilterOutcome::Authenticated(
        Principal::from_identity(&identity),
        PresentedCredential {
            token_id: id,
            expires_at: claims.exp,
        },
    )
}

/// Middleware wrapping [`authenticate`].
pub async fn authentication_filter(
    State(backend): State<AuthBackend>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        let outcome = authenticate(&backend, request.headers()).await;
        match outcome {
            FilterOutcome::Authenticated(principal, credential) => {
                debug!(identity = %principal.identity_key, role = %principal.role, "Authenticated request");
                install_principal(request.extensions_mut(), principal, credential);
            }
            FilterOutcome::Rejected(failure) => {
                debug!(reason = failure.reason(), "Credential rejected");
            }
            FilterOutcome::NoCredential => {}
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::{HeaderValue, header};

    use super::*;
    use crate::auth::AccessPolicy;
    use crate::clock::{Clock, ManualClock};
    use crate::identity::{Identity, IdentityResolver, ResolverError, Role};
    use crate::jwt::JwtConfig;
    use crate::revocation::{FailMode, MemoryRevocationStore, RevocationGuard};
    use crate::routes::RouteRegistry;

    const SECRET: &[u8] = b"filter-test-secret-filter-test-secret";
    const TTL: Duration = Duration::from_secs(15 * 60);

    #[derive(Clone, Copy)]
    enum Lookup {
        Found,
        Fails,
        Hangs,
    }

    /// Resolver that records how often it was asked.
    struct CountingResolver {
        calls: AtomicUsize,
        lookup: Lookup,
    }

    #[async_trait]
    impl IdentityResolver for CountingResolver {
        async fn find_by_verified_email(
            &self,
            email: &str,
        ) -> Result<Option<Identity>, ResolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.lookup {
                Lookup::Found => Ok(Some(Identity {
                    id: 1,
                    email: email.to_string(),
                    password_hash: String::new(),
                    role: Role::Customer,
                    email_verified: true,
                })),
                Lookup::Fails => Err(ResolverError::Backend("connection reset".into())),
                Lookup::Hangs => std::future::pending().await,
            }
        }
    }

    struct Fixture {
        backend: AuthBackend,
        clock: Arc<ManualClock>,
        resolver: Arc<CountingResolver>,
    }

    impl Fixture {
        fn new(lookup: Lookup) -> Self {
            let clock = ManualClock::new(1_700_000_000);
            let resolver = Arc::new(CountingResolver {
                calls: AtomicUsize::new(0),
                lookup,
            });
            let store = Arc::new(MemoryRevocationStore::new(clock.clone()));
            let backend = AuthBackend {
                jwt: Arc::new(JwtConfig::new(SECRET, clock.clone())),
                revocations: RevocationGuard::new(store, Duration::from_millis(250), FailMode::Closed),
                identities: resolver.clone(),
                resolver_timeout: Duration::from_millis(20),
                policy: Arc::new(AccessPolicy::new()),
                routes: Arc::new(RouteRegistry::new()),
            };
            Self {
                backend,
                clock,
                resolver,
            }
        }

        fn token(&self) -> String {
            self.backend
                .jwt
                .generate_access_token("user@example.com", Role::Customer, TTL)
                .unwrap()
                .token
        }

        async fn authenticate(&self, token: &str) -> FilterOutcome {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
            authenticate(&self.backend, &headers).await
        }

        fn lookups(&self) -> usize {
            self.resolver.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_valid_token_resolves_identity_once() {
        let fixture = Fixture::new(Lookup::Found);
        let token = fixture.token();

        let outcome = fixture.authenticate(&token).await;
        let FilterOutcome::Authenticated(principal, credential) = outcome else {
            panic!("expected a principal, got {:?}", outcome);
        };
        assert_eq!(principal.identity_key, "user@example.com");
        assert_eq!(credential.token_id, token_id(&token));
        assert_eq!(fixture.lookups(), 1);
    }

    #[tokio::test]
    async fn test_no_header_is_no_credential() {
        let fixture = Fixture::new(Lookup::Found);
        let outcome = authenticate(&fixture.backend, &HeaderMap::new()).await;
        assert_eq!(outcome, FilterOutcome::NoCredential);
        assert_eq!(fixture.lookups(), 0);
    }

    #[tokio::test]
    async fn test_forged_token_rejected_before_lookup() {
        let fixture = Fixture::new(Lookup::Found);
        let forged = JwtConfig::new(b"some-other-secret", fixture.clock.clone())
            .generate_access_token("user@example.com", Role::Admin, TTL)
            .unwrap()
            .token;

        assert_eq!(
            fixture.authenticate(&forged).await,
            FilterOutcome::Rejected(CredentialFailure::SignatureInvalid)
        );
        assert_eq!(fixture.lookups(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_rejected_before_lookup() {
        let fixture = Fixture::new(Lookup::Found);
        let token = fixture.token();
        fixture.clock.advance(TTL + Duration::from_secs(1));

        assert_eq!(
            fixture.authenticate(&token).await,
            FilterOutcome::Rejected(CredentialFailure::Expired)
        );
        assert_eq!(fixture.lookups(), 0);
    }

    #[tokio::test]
    async fn test_blacklisted_token_rejected_before_lookup() {
        let fixture = Fixture::new(Lookup::Found);
        let token = fixture.token();
        fixture
            .backend
            .revocations
            .blacklist_access(&token_id(&token), fixture.clock.now() + TTL.as_secs())
            .await
            .unwrap();

        assert_eq!(
            fixture.authenticate(&token).await,
            FilterOutcome::Rejected(CredentialFailure::Revoked)
        );
        assert_eq!(fixture.lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolver_error_is_resolver_unavailable() {
        let fixture = Fixture::new(Lookup::Fails);
        let token = fixture.token();

        assert_eq!(
            fixture.authenticate(&token).await,
            FilterOutcome::Rejected(CredentialFailure::ResolverUnavailable)
        );
        assert_eq!(fixture.lookups(), 1);
    }

    #[tokio::test]
    async fn test_resolver_timeout_is_resolver_unavailable() {
        let fixture = Fixture::new(Lookup::Hangs);
        let token = fixture.token();

        assert_eq!(
            fixture.authenticate(&token).await,
            FilterOutcome::Rejected(CredentialFailure::ResolverUnavailable)
        );
        assert_eq!(fixture.lookups(), 1);
    }
}
