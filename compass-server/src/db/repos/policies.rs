//! Client policy repository

use chrono::{DateTime, Utc};
use compass_core::policy::{PolicyKind, PolicyRule};
use compass_core::Amount;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::DbError;
use crate::models::ValidationError;

const POLICY_COLUMNS: &str = "client_id, kind, amount_cents, enabled, updated_at";

/// Policy record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Policy {
    pub client_id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: PolicyKind,
    pub amount_cents: Option<i64>,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// The evaluable rule, when enabled and complete
    pub fn rule(&self) -> Option<PolicyRule> {
        if !self.enabled {
            return None;
        }
        PolicyRule::from_stored(self.kind, self.amount_cents.map(Amount::from_cents))
    }
}

/// Policy repository
pub struct PolicyRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PolicyRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Policy>, DbError> {
        let policies = sqlx::query_as(&format!(
            "SELECT {POLICY_COLUMNS} FROM policies WHERE client_id = $1 ORDER BY kind"
        ))
        .bind(client_id)
        .fetch_all(self.pool)
        .await?;
        Ok(policies)
    }

    /// Insert or replace the policy of a kind for a client.
    pub async fn upsert(
        &self,
        client_id: Uuid,
        kind: PolicyKind,
        amount_cents: Option<i64>,
        enabled: bool,
    ) -> Result<Policy, DbError> {
        let amount_cents = validate_amount(kind, amount_cents)?;

        let mut tx = self.pool.begin().await?;
        let client_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)")
                .bind(client_id)
                .fetch_one(&mut *tx)
                .await?;
        if !client_exists.0 {
            return Err(DbError::not_found("client", client_id));
        }

        let policy = sqlx::query_as(&format!(
            r#"
            INSERT INTO policies (client_id, kind, amount_cents, enabled)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (client_id, kind) DO UPDATE SET
                amount_cents = EXCLUDED.amount_cents,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING {POLICY_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(kind.as_str())
        .bind(amount_cents)
        .bind(enabled)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(policy)
    }

    pub async fn toggle(&self, client_id: Uuid, kind: PolicyKind) -> Result<Policy, DbError> {
        sqlx::query_as(&format!(
            r#"
            UPDATE policies SET enabled = NOT enabled, updated_at = NOW()
            WHERE client_id = $1 AND kind = $2
            RETURNING {POLICY_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(kind.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("policy", kind))
    }

    pub async fn delete(&self, client_id: Uuid, kind: PolicyKind) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM policies WHERE client_id = $1 AND kind = $2")
            .bind(client_id)
            .bind(kind.as_str())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("policy", kind));
        }
        Ok(())
    }
}

/// Enabled rules for a client, read inside a write transaction.
pub(crate) async fn load_rules(
    tx: &mut Transaction<'_, Postgres>,
    client_id: Uuid,
) -> Result<Vec<PolicyRule>, DbError> {
    let policies: Vec<Policy> = sqlx::query_as(&format!(
        "SELECT {POLICY_COLUMNS} FROM policies WHERE client_id = $1 AND enabled"
    ))
    .bind(client_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(policies.iter().filter_map(Policy::rule).collect())
}

/// Amount kinds need a positive amount; the others must not carry one.
fn validate_amount(kind: PolicyKind, amount_cents: Option<i64>) -> Result<Option<i64>, ValidationError> {
    match (kind.needs_amount(), amount_cents) {
        (true, Some(cents)) if cents > 0 => Ok(Some(cents)),
        (true, _) => Err(ValidationError::OutOfRange {
            field: "amount_cents",
            reason: format!("must be a positive amount for {}", kind),
        }),
        (false, Some(_)) => Err(ValidationError::OutOfRange {
            field: "amount_cents",
            reason: format!("is not used by {}", kind),
        }),
        (false, None) => Ok(None),
    }
}
