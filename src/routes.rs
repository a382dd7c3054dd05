//! Registered-route table.
//!
//! Routes are added through [`RouteTable`], which records every method and
//! path in a [`RouteRegistry`] while building the axum router. The registry is
//! what the entry point queries to tell a missing endpoint from a protected one.

use axum::Router;
use axum::http::Method;
use axum::routing::MethodRouter;

/// Match a path against a route pattern, ignoring empty segments.
///
/// Pattern segments:
/// - literal text matches itself
/// - `{name}` or `*` matches exactly one segment
/// - `{*name}` or `**` matches the remaining segments (including none)
///
/// Used for access rules, where `/api/admin//x` must still fall under
/// `/api/admin/**`.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    match_segments(lenient_segments(pattern), lenient_segments(path))
}

/// Match a path the way the router does: every `/` counts, so a trailing or
/// doubled slash is a different path.
pub fn route_matches(pattern: &str, path: &str) -> bool {
    match (pattern.strip_prefix('/'), path.strip_prefix('/')) {
        (Some(pattern), Some(path)) => match_segments(pattern.split('/'), path.split('/')),
        _ => false,
    }
}

fn match_segments<'a>(
    mut pattern_segments: impl Iterator<Item = &'a str>,
    mut path_segments: impl Iterator<Item = &'a str>,
) -> bool {
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), _) if is_rest(p) => return true,
            (Some(p), Some(s)) if is_single(p) && !s.is_empty() => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

fn lenient_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn is_rest(segment: &str) -> bool {
    segment == "**" || (segment.starts_with("{*") && segment.ends_with('}'))
}

fn is_single(segment: &str) -> bool {
    segment == "*" || (segment.starts_with('{') && segment.ends_with('}'))
}

#[derive(Debug, Clone)]
struct RegisteredRoute {
    method: Method,
    pattern: String,
}

/// Every method + path the application serves.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<RegisteredRoute>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: Method, pattern: &str) {
        self.routes.push(RegisteredRoute {
            method,
            pattern: pattern.to_string(),
        });
    }

    /// Whether any handler is registered for this method and path.
    /// `HEAD` is served wherever `GET` is.
    pub fn has_handler(&self, method: &Method, path: &str) -> bool {
        self.routes.iter().any(|route| {
            let method_ok =
                route.method == *method || (*method == Method::HEAD && route.method == Method::GET);
            method_ok && route_matches(&route.pattern, path)
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Router builder that keeps the registry in step with the axum routes.
pub struct RouteTable<S = ()> {
    router: Router<S>,
    registry: RouteRegistry,
}

impl<S> RouteTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            registry: RouteRegistry::new(),
        }
    }

    pub fn route(mut self, method: Method, path: &str, handler: MethodRouter<S>) -> Self {
        self.registry.register(method, path);
        self.router = self.router.route(path, handler);
        self
    }

    pub fn get(self, path: &str, handler: MethodRouter<S>) -> Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: MethodRouter<S>) -> Self {
        self.route(Method::POST, path, handler)
    }

    pub fn into_parts(self) -> (Router<S>, RouteRegistry) {
        (self.router, self.registry)
    }
}

impl<S> Default for RouteTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
