//! Ordered access rules, evaluated first-match-wins.

use axum::http::Method;

use super::principal::Principal;
use crate::identity::Role;
use crate::routes::path_matches;

/// What a matched rule demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Anyone, with or without a principal.
    Permit,
    /// Any authenticated principal.
    Authenticated,
    /// A principal holding one of these roles.
    AnyRole(Vec<Role>),
}

#[derive(Debug, Clone)]
pub struct AccessRule {
    /// `None` matches every method.
    pub method: Option<Method>,
    pub pattern: String,
    pub requirement: Requirement,
}

impl AccessRule {
    /// `HEAD` falls under rules written for `GET`, as the router serves it there.
    fn matches(&self, method: &Method, path: &str) -> bool {
        let method_ok = self
            .method
            .as_ref()
            .is_none_or(|m| m == method || (*m == Method::GET && *method == Method::HEAD));
        method_ok && path_matches(&self.pattern, path)
    }
}

/// Result of evaluating the policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Needs a principal and there is none.
    Unauthenticated,
    /// Has a principal, lacks the role.
    Forbidden,
}

/// Ordered rule table. Requests matching no rule require authentication.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, method: Option<Method>, pattern: &str, requirement: Requirement) -> Self {
        self.rules.push(AccessRule {
            method,
            pattern: pattern.to_string(),
            requirement,
        });
        self
    }

    pub fn permit(self, method: Method, pattern: &str) -> Self {
        self.rule(Some(method), pattern, Requirement::Permit)
    }

    pub fn permit_all(self, pattern: &str) -> Self {
        self.rule(None, pattern, Requirement::Permit)
    }

    pub fn authenticated(self, pattern: &str) -> Self {
        self.rule(None, pattern, Requirement::Authenticated)
    }

    pub fn has_role(self, pattern: &str, role: Role) -> Self {
        self.rule(None, pattern, Requirement::AnyRole(vec![role]))
    }

    pub fn has_any_role(self, pattern: &str, roles: &[Role]) -> Self {
        self.rule(None, pattern, Requirement::AnyRole(roles.to_vec()))
    }

    /// The requirement of the first matching rule.
    pub fn requirement_for(&self, method: &Method, path: &str) -> &Requirement {
        const DEFAULT: &Requirement = &Requirement::Authenticated;
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| &rule.requirement)
            .unwrap_or(DEFAULT)
    }

    pub fn evaluate(&self, method: &Method, path: &str, principal: Option<&Principal>) -> Decision {
        match (self.requirement_for(method, path), principal) {
            (Requirement::Permit, _) => Decision::Allow,
            (_, None) => Decision::Unauthenticated,
            (Requirement::Authenticated, Some(_)) => Decision::Allow,
            (Requirement::AnyRole(roles), Some(p)) => {
                if roles.iter().any(|r| p.has_role(*r)) {
                    Decision::Allow
                } else {
                    Decision::Forbidden
                }
            }
        }
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn principal(role: Role) -> Principal {
        Principal::from_identity(&Identity {
            id: 1,
            email: "user@example.com".into(),
            password_hash: String::new(),
            role,
            email_verified: true,
        })
    }

    fn policy() -> AccessPolicy {
        AccessPolicy::new()
            .permit(Method::POST, "/api/auth/login")
            .permit_all("/api/public/**")
            .has_role("/api/admin/**", Role::Admin)
            .authenticated("/api/**")
    }

    #[test]
    fn test_permit_needs_no_principal() {
        let policy = policy();
        assert_eq!(
            policy.evaluate(&Method::POST, "/api/auth/login", None),
            Decision::Allow
        );
        assert_eq!(
            policy.evaluate(&Method::GET, "/api/public/a/b", None),
            Decision::Allow
        );
    }

    #[test]
    fn test_method_specific_rule() {
        let policy = policy();
        // GET on the login path falls through to the authenticated catch-all.
        assert_eq!(
            policy.evaluate(&Method::GET, "/api/auth/login", None),
            Decision::Unauthenticated
        );
    }

    #[test]
    fn test_head_follows_get_rules() {
        let policy = AccessPolicy::new()
            .permit(Method::GET, "/api/health")
            .authenticated("/api/**");

        assert_eq!(
            policy.evaluate(&Method::HEAD, "/api/health", None),
            Decision::Allow
        );
        assert_eq!(
            policy.evaluate(&Method::POST, "/api/health", None),
            Decision::Unauthenticated
        );
    }

    #[test]
    fn test_role_rule() {
        let policy = policy();
        assert_eq!(
            policy.evaluate(&Method::GET, "/api/admin/stats", None),
            Decision::Unauthenticated
        );
        assert_eq!(
            policy.evaluate(&Method::GET, "/api/admin/stats", Some(&principal(Role::Customer))),
            Decision::Forbidden
        );
        assert_eq!(
            policy.evaluate(&Method::GET, "/api/admin/stats", Some(&principal(Role::Admin))),
            Decision::Allow
        );
    }

    #[test]
    fn test_first_match_wins() {
        let policy = AccessPolicy::new()
            .permit_all("/api/admin/health")
            .has_role("/api/admin/**", Role::Admin);

        assert_eq!(
            policy.evaluate(&Method::GET, "/api/admin/health", None),
            Decision::Allow
        );

        let reversed = AccessPolicy::new()
            .has_role("/api/admin/**", Role::Admin)
            .permit_all("/api/admin/health");
        assert_eq!(
            reversed.evaluate(&Method::GET, "/api/admin/health", None),
            Decision::Unauthenticated
        );
    }

    #[test]
    fn test_unmatched_requires_authentication() {
        let policy = AccessPolicy::new();
        assert_eq!(
            policy.evaluate(&Method::GET, "/whatever", None),
            Decision::Unauthenticated
        );
        assert_eq!(
            policy.evaluate(&Method::GET, "/whatever", Some(&principal(Role::Customer))),
            Decision::Allow
        );
    }

    #[test]
    fn test_any_role() {
        let policy = AccessPolicy::new().has_any_role("/orders/**", &[Role::Customer, Role::Admin]);
        assert_eq!(
            policy.evaluate(&Method::GET, "/orders/1", Some(&principal(Role::Customer))),
            Decision::Allow
        );
        assert_eq!(policy.rules().len(), 1);
    }
}
