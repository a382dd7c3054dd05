use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::Database;
use crate::identity::{Identity, IdentityResolver, ResolverError, Role};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
    email_verified: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: Role::from_str(&row.role),
            email_verified: row.email_verified != 0,
        }
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            email_verified: user.email_verified,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user with an unverified email. Returns the user ID.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, role, email_verified) VALUES (?, ?, ?, 0)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Mark a user's email as verified.
    pub async fn mark_verified(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET email_verified = 1 WHERE id = ? AND email_verified = 0")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a user by email, verified or not.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, role, email_verified FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email only if the email has been verified.
    pub async fn get_verified_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, role, email_verified FROM users WHERE email = ? AND email_verified = 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IdentityResolver for Database {
    async fn find_by_verified_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, ResolverError> {
        self.users()
            .get_verified_by_email(email)
            .await
            .map(|user| user.map(Identity::from))
            .map_err(|e| ResolverError::Backend(e.to_string()))
    }
}
