//! Shared harness for HTTP-level tests.
//!
//! Builds the full router over an in-memory SQLite database with a manually
//! driven clock, so token expiry can be exercised without sleeping.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tollgate::{
    ServerConfig, create_app,
    clock::ManualClock,
    db::Database,
    identity::Role,
    jwt::{JwtConfig, TokenLifetimes},
    revocation::{DEFAULT_STORE_TIMEOUT, FailMode, RevocationStore, StoreError},
    session::ReusePolicy,
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-with-enough-length";
pub const PASSWORD: &str = "correct horse battery";
pub const START: u64 = 1_700_000_000;

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub jwt: JwtConfig,
    pub store: Arc<dyn RevocationStore>,
}

pub struct TestOptions {
    pub store: Option<Arc<dyn RevocationStore>>,
    pub fail_mode: FailMode,
    pub reuse_policy: ReusePolicy,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            store: None,
            fail_mode: FailMode::Closed,
            reuse_policy: ReusePolicy::RevokeChain,
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let clock = ManualClock::new(START);
        let store: Arc<dyn RevocationStore> = match options.store {
            Some(store) => store,
            None => Arc::new(db.revocations(clock.clone())),
        };

        let config = ServerConfig {
            identities: Arc::new(db.clone()),
            revocations: store.clone(),
            jwt_secret: JWT_SECRET.to_vec(),
            token_lifetimes: TokenLifetimes::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            resolver_timeout: Duration::from_secs(1),
            fail_mode: options.fail_mode,
            reuse_policy: options.reuse_policy,
            login_rate_per_minute: 1000,
            trust_forwarded_for: false,
            clock: clock.clone(),
        };

        Self {
            app: create_app(&config),
            jwt: JwtConfig::new(JWT_SECRET, clock.clone()),
            db,
            clock,
            store,
        }
    }

    /// Create a user with `PASSWORD`. Returns the user id.
    pub async fn create_user(&self, email: &str, role: Role, verified: bool) -> i64 {
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let id = self.db.users().create(email, &hash, role).await.unwrap();
        if verified {
            self.db.users().mark_verified(id).await.unwrap();
        }
        id
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, body).await
    }

    /// Log in through the API and return (access_token, refresh_token).
    pub async fn login(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                Some(serde_json::json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        tokens_of(&body)
    }

    pub async fn refresh(&self, refresh_token: &str) -> (StatusCode, Value) {
        self.post(
            "/api/auth/refresh",
            None,
            Some(serde_json::json!({ "refreshToken": refresh_token })),
        )
        .await
    }
}

pub fn tokens_of(body: &Value) -> (String, String) {
    (
        body["data"]["accessToken"].as_str().unwrap().to_string(),
        body["data"]["refreshToken"].as_str().unwrap().to_string(),
    )
}

/// Assert the denial envelope shape and code.
pub fn assert_envelope(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "body: {}", body);
    assert_eq!(body["errorCode"], code, "body: {}", body);
    assert!(body["message"].is_string());
    assert!(body["timestamp"].as_u64().is_some());
}

/// Revocation store whose every call fails.
pub struct UnreachableStore;

#[async_trait]
impl RevocationStore for UnreachableStore {
    async fn blacklist_access(&self, _: &str, _: u64) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn is_access_blacklisted(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn invalidate_all_refresh(&self, _: &str) -> Result<u64, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn refresh_generation(&self, _: &str) -> Result<u64, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn record_refresh_used(&self, _: &str, _: u64) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn is_refresh_consumed(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn tracked_entries(&self) -> Result<usize, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}
