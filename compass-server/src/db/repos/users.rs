//! Operators and their sessions
//!
//! Only a SHA-256 of each bearer token is stored. The plain token is
//! returned once, when the session is issued.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DbError;
use crate::models::{Role, ValidationError};

/// Operator account
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The user behind a valid session
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Freshly issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a random 32-byte token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash stored in `sessions.token_hash`
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, email: &str, name: &str, role: Role) -> Result<User, DbError> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@example.org",
            }
            .into());
        }

        let user = sqlx::query_as(
            r#"
            INSERT INTO users (email, name, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, role, active, created_at
            "#,
        )
        .bind(&email)
        .bind(name.trim())
        .bind(role.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, DbError> {
        sqlx::query_as(
            "SELECT id, email, name, role, active, created_at FROM users WHERE email = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", email))
    }

    pub async fn list(&self) -> Result<Vec<User>, DbError> {
        let users = sqlx::query_as(
            "SELECT id, email, name, role, active, created_at FROM users ORDER BY email",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    /// Enable or disable an account. Disabled users fail authentication.
    pub async fn set_active(&self, email: &str, active: bool) -> Result<User, DbError> {
        sqlx::query_as(
            r#"
            UPDATE users SET active = $2
            WHERE email = lower($1)
            RETURNING id, email, name, role, active, created_at
            "#,
        )
        .bind(email.trim())
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", email))
    }

    /// Issue a new session for an active user.
    pub async fn issue_session(&self, user_id: Uuid, ttl: Duration) -> Result<IssuedToken, DbError> {
        let token = generate_token();
        let expires_at = Utc::now() + ttl;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, expires_at)
            SELECT $1, id, $3 FROM users WHERE id = $2 AND active
            "#,
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(DbError::not_found("active user", user_id));
        }

        tracing::info!(%user_id, %expires_at, "session issued");
        Ok(IssuedToken { token, expires_at })
    }

    /// Resolve a bearer token to its user. `None` for unknown, expired or disabled.
    pub async fn authenticate(&self, token: &str) -> Result<Option<SessionUser>, DbError> {
        let user = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.name, u.role, s.expires_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
              AND s.expires_at > NOW()
              AND u.active
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(hash_token(token))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete sessions past their expiry. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn session_round_trip() {
        let pool = crate::db::repos::test_support::test_pool().await;
        let repo = UserRepo::new(&pool);
        let email = format!("op-{}@example.org", Uuid::new_v4().simple());
        let user = repo.create(&email, "Operator", Role::Operator).await.unwrap();

        let issued = repo.issue_session(user.id, Duration::hours(1)).await.unwrap();
        let session = repo.authenticate(&issued.token).await.unwrap().expect("valid session");
        assert_eq!(session.id, user.id);
        assert!(!session.is_admin());

        repo.set_active(&email, false).await.unwrap();
        assert!(repo.authenticate(&issued.token).await.unwrap().is_none());

        assert!(repo.revoke(&issued.token).await.unwrap());
    }
}
