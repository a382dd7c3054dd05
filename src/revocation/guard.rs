//! Timeout and failure policy around a revocation store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::{RevocationStore, StoreError};

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// What the authentication filter does when the blacklist cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailMode {
    /// Treat the token as revoked. Requests fall back to unauthenticated.
    #[default]
    Closed,
    /// Accept the token as not revoked. A revoked token may be honoured until
    /// the store comes back or the token expires.
    Open,
}

/// Wraps a store so every call is time-bounded and blacklist reads follow
/// the configured fail mode.
#[derive(Clone)]
pub struct RevocationGuard {
    store: Arc<dyn RevocationStore>,
    timeout: Duration,
    fail_mode: FailMode,
}

impl RevocationGuard {
    pub fn new(store: Arc<dyn RevocationStore>, timeout: Duration, fail_mode: FailMode) -> Self {
        Self {
            store,
            timeout,
            fail_mode,
        }
    }

    pub fn store(&self) -> &Arc<dyn RevocationStore> {
        &self.store
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Blacklist check for the request path. Returns `Err` only when the store
    /// failed and the fail mode is `Closed`.
    pub async fn check_access(&self, token_id: &str) -> Result<bool, StoreError> {
        match self.bounded(self.store.is_access_blacklisted(token_id)).await {
            Ok(revoked) => Ok(revoked),
            Err(e) => match self.fail_mode {
                FailMode::Closed => {
                    error!(error = %e, "Revocation store unavailable, rejecting credential");
                    Err(e)
                }
                FailMode::Open => {
                    error!(error = %e, "Revocation store unavailable, accepting credential (fail-open)");
                    Ok(false)
                }
            },
        }
    }

    pub async fn blacklist_access(&self, token_id: &str, expires_at: u64) -> Result<(), StoreError> {
        self.bounded(self.store.blacklist_access(token_id, expires_at))
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to blacklist access token"))
    }

    pub async fn invalidate_all_refresh(&self, identity_key: &str) -> Result<u64, StoreError> {
        self.bounded(self.store.invalidate_all_refresh(identity_key))
            .await
    }

    pub async fn refresh_generation(&self, identity_key: &str) -> Result<u64, StoreError> {
        self.bounded(self.store.refresh_generation(identity_key)).await
    }

    pub async fn record_refresh_used(&self, jti: &str, expires_at: u64) -> Result<bool, StoreError> {
        self.bounded(self.store.record_refresh_used(jti, expires_at))
            .await
    }

    pub async fn is_refresh_consumed(&self, jti: &str) -> Result<bool, StoreError> {
        self.bounded(self.store.is_refresh_consumed(jti)).await
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.bounded(self.store.purge_expired()).await
    }

    pub async fn tracked_entries(&self) -> Result<usize, StoreError> {
        self.bounded(self.store.tracked_entries()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Store whose reads never complete or always fail.
    struct BrokenStore {
        hang: bool,
    }

    #[async_trait]
    impl RevocationStore for BrokenStore {
        async fn blacklist_access(&self, _: &str, _: u64) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn is_access_blacklisted(&self, _: &str) -> Result<bool, StoreError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(StoreError::Backend("down".into()))
        }
        async fn invalidate_all_refresh(&self, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn refresh_generation(&self, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn record_refresh_used(&self, _: &str, _: u64) -> Result<bool, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn is_refresh_consumed(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn purge_expired(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn tracked_entries(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn guard(hang: bool, fail_mode: FailMode) -> RevocationGuard {
        RevocationGuard::new(
            Arc::new(BrokenStore { hang }),
            Duration::from_millis(20),
            fail_mode,
        )
    }

    #[tokio::test]
    async fn test_fail_closed_rejects() {
        let result = guard(false, FailMode::Closed).check_access("t").await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_fail_open_accepts() {
        let result = guard(false, FailMode::Open).check_access("t").await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_hanging_store_times_out() {
        let result = guard(true, FailMode::Closed).check_access("t").await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn test_writes_never_fail_open() {
        let guard = guard(false, FailMode::Open);
        assert!(guard.record_refresh_used("jti", 10).await.is_err());
        assert!(guard.blacklist_access("t", 10).await.is_err());
    }
}
