//! Shared state for the authentication filter and authorization gate.

use std::sync::Arc;
use std::time::Duration;

use super::policy::AccessPolicy;
use crate::identity::IdentityResolver;
use crate::jwt::JwtConfig;
use crate::revocation::RevocationGuard;
use crate::routes::RouteRegistry;

/// Everything the per-request gate needs. Cheap to clone.
#[derive(Clone)]
pub struct AuthBackend {
    pub jwt: Arc<JwtConfig>,
    pub revocations: RevocationGuard,
    pub identities: Arc<dyn IdentityResolver>,
    /// Bound on a single identity lookup
    pub resolver_timeout: Duration,
    pub policy: Arc<AccessPolicy>,
    pub routes: Arc<RouteRegistry>,
}
