//! Client repository
//!
//! Clients own every other record. Deleting one that still has donors,
//! batches or periods fails on the foreign key and surfaces as a conflict.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{paginate, DbError, WithTotal};
use crate::models::{ClientCode, Paginated, Pagination};

/// Client record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Client repository
pub struct ClientRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a client. A duplicate code is a conflict.
    pub async fn create(&self, code: ClientCode, name: String) -> Result<Client, DbError> {
        let client = sqlx::query_as(
            r#"
            INSERT INTO clients (code, name)
            VALUES ($1, $2)
            RETURNING id, code, name, active, created_at
            "#,
        )
        .bind(code.as_str())
        .bind(&name)
        .fetch_one(self.pool)
        .await?;

        Ok(client)
    }

    /// List clients, optionally only active or inactive ones.
    pub async fn list(
        &self,
        active: Option<bool>,
        page: Pagination,
    ) -> Result<Paginated<Client>, DbError> {
        let rows: Vec<WithTotal<Client>> = sqlx::query_as(
            r#"
            SELECT id, code, name, active, created_at, COUNT(*) OVER() AS total
            FROM clients
            WHERE ($1::boolean IS NULL OR active = $1)
            ORDER BY name ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(active)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    pub async fn get(&self, id: Uuid) -> Result<Client, DbError> {
        sqlx::query_as("SELECT id, code, name, active, created_at FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("client", id))
    }

    pub async fn rename(&self, id: Uuid, name: String) -> Result<Client, DbError> {
        sqlx::query_as(
            r#"
            UPDATE clients SET name = $2
            WHERE id = $1
            RETURNING id, code, name, active, created_at
            "#,
        )
        .bind(id)
        .bind(&name)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("client", id))
    }

    /// Flip the active flag.
    pub async fn toggle_active(&self, id: Uuid) -> Result<Client, DbError> {
        sqlx::query_as(
            r#"
            UPDATE clients SET active = NOT active
            WHERE id = $1
            RETURNING id, code, name, active, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("client", id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("client", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests - run with DATABASE_URL set
    // cargo test -p compass-server -- --ignored

    use super::*;
    use crate::db::repos::test_support::test_pool;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_code_is_conflict() {
        let pool = test_pool().await;
        let repo = ClientRepo::new(&pool);
        let code = format!("dup-{}", &Uuid::new_v4().simple().to_string()[..8]);

        repo.create(ClientCode::new(&code).unwrap(), "First".into())
            .await
            .expect("first insert");
        let err = repo
            .create(ClientCode::new(&code).unwrap(), "Second".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn toggle_active_flips() {
        let pool = test_pool().await;
        let repo = ClientRepo::new(&pool);
        let code = format!("tgl-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let client = repo
            .create(ClientCode::new(&code).unwrap(), "Toggle".into())
            .await
            .unwrap();

        assert!(client.active);
        assert!(!repo.toggle_active(client.id).await.unwrap().active);
        assert!(repo.toggle_active(client.id).await.unwrap().active);
        repo.delete(client.id).await.unwrap();
    }
}
