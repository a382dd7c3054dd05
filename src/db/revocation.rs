//! SQLite-backed revocation store.
//!
//! Rows carry their expiry as Unix seconds; reads ignore expired rows and the
//! cleanup task deletes them. Consumption uses `INSERT .. ON CONFLICT DO NOTHING`
//! so only one concurrent caller ever sees an inserted row.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::clock::Clock;
use crate::revocation::{RevocationStore, StoreError};

pub struct SqliteRevocationStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteRevocationStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now(&self) -> i64 {
        sql_time(self.clock.now())
    }
}

/// Unix seconds as stored in SQLite. Saturates instead of wrapping negative.
fn sql_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[async_trait]
impl RevocationStore for SqliteRevocationStore {
    async fn blacklist_access(&self, token_id: &str, expires_at: u64) -> Result<(), StoreError> {
        let expires_at = sql_time(expires_at);
        if expires_at <= self.now() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO revoked_access_tokens (token_id, expires_at) VALUES (?, ?) ON CONFLICT(token_id) DO NOTHING",
        )
        .bind(token_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_access_blacklisted(&self, token_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM revoked_access_tokens WHERE token_id = ? AND expires_at > ?",
        )
        .bind(token_id)
        .bind(self.now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn invalidate_all_refresh(&self, identity_key: &str) -> Result<u64, StoreError> {
        let (generation,): (i64,) = sqlx::query_as(
            "INSERT INTO refresh_generations (identity, generation) VALUES (?, 1)
             ON CONFLICT(identity) DO UPDATE SET generation = generation + 1
             RETURNING generation",
        )
        .bind(identity_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(generation as u64)
    }

    async fn refresh_generation(&self, identity_key: &str) -> Result<u64, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT generation FROM refresh_generations WHERE identity = ?")
                .bind(identity_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0 as u64).unwrap_or(0))
    }

    async fn record_refresh_used(&self, jti: &str, expires_at: u64) -> Result<bool, StoreError> {
        let expires_at = sql_time(expires_at).max(self.now().saturating_add(1));
        let result = sqlx::query(
            "INSERT INTO consumed_refresh_tokens (jti, expires_at) VALUES (?, ?) ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_refresh_consumed(&self, jti: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM consumed_refresh_tokens WHERE jti = ? AND expires_at > ?")
                .bind(jti)
                .bind(self.now())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.now();
        let access = sqlx::query("DELETE FROM revoked_access_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let refresh = sqlx::query("DELETE FROM consumed_refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(access.rows_affected() + refresh.rows_affected())
    }

    async fn tracked_entries(&self) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM revoked_access_tokens) + (SELECT COUNT(*) FROM consumed_refresh_tokens)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}
