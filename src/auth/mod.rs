//! Bearer-token authentication with ordered role-based access rules.
//!
//! Two middleware layers run on every request. The authentication filter
//! turns an `Authorization: Bearer` header into a [`Principal`] when the
//! token is valid, unrevoked and belongs to a verified identity. The
//! authorization gate then evaluates the [`AccessPolicy`] and, on denial,
//! picks 404, 401 or 403.

mod bearer;
mod entry_point;
mod errors;
mod filter;
mod ip;
mod policy;
mod principal;
mod state;

pub use bearer::bearer_token;
pub use entry_point::{authorization_gate, disambiguate, not_found_fallback};
pub use errors::{Denial, ErrorEnvelope};
pub use filter::{CredentialFailure, FilterOutcome, authenticate, authentication_filter};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use policy::{AccessPolicy, AccessRule, Decision, Requirement};
pub use principal::{
    Authenticated, CurrentCredential, PresentedCredential, Principal,
    install_principal,
};
pub use state::AuthBackend;
