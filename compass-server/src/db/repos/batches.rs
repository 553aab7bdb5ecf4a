//! Batch repository
//!
//! A batch is open while donations are being keyed, then closed for
//! deposit. Closed batches can be cleared during reconciliation.

use chrono::{DateTime, NaiveDate, Utc};
use compass_core::Amount;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{paginate, DbError, WithTotal};
use crate::models::{BatchStatus, Paginated, Pagination};

const BATCH_COLUMNS: &str = "b.id, b.client_id, b.name, b.batch_date, b.status, b.cleared, \
                             b.reconciliation_period_id, b.created_by, b.created_at, b.closed_at";

/// Batch record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub batch_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: BatchStatus,
    pub cleared: bool,
    pub reconciliation_period_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn is_open(&self) -> bool {
        self.status == BatchStatus::Open
    }
}

/// Batch with donation count and deposit total
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BatchWithTotals {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub batch: Batch,
    pub donation_count: i64,
    #[sqlx(try_from = "i64")]
    pub total_cents: Amount,
}

/// Batch list filters
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
    pub period_id: Option<Uuid>,
}

/// Batch repository
pub struct BatchRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BatchRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an open batch for an active client.
    pub async fn create(
        &self,
        client_id: Uuid,
        name: String,
        batch_date: NaiveDate,
        created_by: Option<Uuid>,
    ) -> Result<Batch, DbError> {
        let mut tx = self.pool.begin().await?;

        let active: Option<(bool,)> = sqlx::query_as("SELECT active FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?;
        match active {
            None => return Err(DbError::not_found("client", client_id)),
            Some((false,)) => return Err(DbError::conflict("client is inactive")),
            Some((true,)) => {}
        }

        let batch = sqlx::query_as(&format!(
            r#"
            INSERT INTO batches AS b (client_id, name, batch_date, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(&name)
        .bind(batch_date)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    /// List batches with totals, newest batch date first.
    pub async fn list(
        &self,
        filter: &BatchFilter,
        page: Pagination,
    ) -> Result<Paginated<BatchWithTotals>, DbError> {
        let rows: Vec<WithTotal<BatchWithTotals>> = sqlx::query_as(&format!(
            r#"
            SELECT {BATCH_COLUMNS},
                   COUNT(d.id) AS donation_count,
                   COALESCE(SUM(d.amount_cents), 0)::bigint AS total_cents,
                   COUNT(*) OVER() AS total
            FROM batches b
            LEFT JOIN donations d ON d.batch_id = b.id
            WHERE ($1::uuid IS NULL OR b.client_id = $1)
              AND ($2::text IS NULL OR b.status = $2)
              AND ($3::uuid IS NULL OR b.reconciliation_period_id = $3)
            GROUP BY b.id
            ORDER BY b.batch_date DESC, b.created_at DESC, b.id
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.client_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.period_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    /// Get a batch with its totals.
    pub async fn get(&self, id: Uuid) -> Result<BatchWithTotals, DbError> {
        sqlx::query_as(&format!(
            r#"
            SELECT {BATCH_COLUMNS},
                   COUNT(d.id) AS donation_count,
                   COALESCE(SUM(d.amount_cents), 0)::bigint AS total_cents
            FROM batches b
            LEFT JOIN donations d ON d.batch_id = b.id
            WHERE b.id = $1
            GROUP BY b.id
            "#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("batch", id))
    }

    /// Rename or re-date an open batch.
    pub async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        batch_date: Option<NaiveDate>,
    ) -> Result<Batch, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open(&mut tx, id).await?;

        let batch = sqlx::query_as(&format!(
            r#"
            UPDATE batches AS b SET
                name = COALESCE($2, b.name),
                batch_date = COALESCE($3, b.batch_date)
            WHERE b.id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(batch_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    pub async fn close(&self, id: Uuid) -> Result<Batch, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open(&mut tx, id).await?;

        let batch = sqlx::query_as(&format!(
            r#"
            UPDATE batches AS b SET status = 'closed', closed_at = NOW()
            WHERE b.id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(batch_id = %id, "batch closed");
        Ok(batch)
    }

    /// Reopen a closed batch. Cleared batches stay closed.
    pub async fn reopen(&self, id: Uuid) -> Result<Batch, DbError> {
        let mut tx = self.pool.begin().await?;
        let batch = lock(&mut tx, id).await?;

        if batch.is_open() {
            return Err(DbError::conflict("batch is already open"));
        }
        if batch.cleared {
            return Err(DbError::conflict("cleared batches cannot be reopened"));
        }

        let batch = sqlx::query_as(&format!(
            r#"
            UPDATE batches AS b SET status = 'open', closed_at = NULL
            WHERE b.id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    /// Flip the cleared flag on a closed batch.
    ///
    /// A batch matched to a bank transaction stays cleared until it is unmatched.
    pub async fn toggle_cleared(&self, id: Uuid) -> Result<Batch, DbError> {
        let mut tx = self.pool.begin().await?;
        let period_id = lock_period_of(&mut tx, id).await?;
        let batch = lock(&mut tx, id).await?;

        if batch.reconciliation_period_id != period_id {
            return Err(DbError::conflict(
                "batch moved between reconciliation periods; retry",
            ));
        }
        if batch.is_open() {
            return Err(DbError::conflict("only closed batches can be cleared"));
        }

        if batch.cleared {
            let (matched,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM bank_transactions WHERE matched_batch_id = $1)",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if matched {
                return Err(DbError::conflict(
                    "batch is matched to a bank transaction; unmatch it first",
                ));
            }
        }

        let batch = sqlx::query_as(&format!(
            r#"
            UPDATE batches AS b SET cleared = NOT b.cleared
            WHERE b.id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    /// Delete an open batch together with its donations.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open(&mut tx, id).await?;

        sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(batch_id = %id, "batch deleted");
        Ok(())
    }
}

/// Lock a batch row for the rest of the transaction.
pub(crate) async fn lock(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Batch, DbError> {
    sqlx::query_as(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches b WHERE b.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| DbError::not_found("batch", id))
}

/// Lock a batch and require it to be open.
pub(crate) async fn lock_open(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Batch, DbError> {
    let batch = lock(tx, id).await?;
    if !batch.is_open() {
        return Err(DbError::conflict(format!("batch '{}' is closed", id)));
    }
    Ok(batch)
}

/// Lock the reconciliation period a batch belongs to, failing when it is closed.
///
/// Taken before the batch row, matching the period-first order of
/// reconciliation writes.
async fn lock_period_of(
    tx: &mut Transaction<'_, Postgres>,
    batch_id: Uuid,
) -> Result<Option<Uuid>, DbError> {
    let row: Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT reconciliation_period_id FROM batches WHERE id = $1")
            .bind(batch_id)
            .fetch_optional(&mut **tx)
            .await?;
    let Some((period_id,)) = row else {
        return Err(DbError::not_found("batch", batch_id));
    };
    let Some(period_id) = period_id else {
        return Ok(None);
    };

    let status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM reconciliation_periods WHERE id = $1 FOR UPDATE")
            .bind(period_id)
            .fetch_optional(&mut **tx)
            .await?;
    match status {
        Some((s,)) if s == "closed" => Err(DbError::conflict(format!(
            "reconciliation period '{}' is closed",
            period_id
        ))),
        _ => Ok(Some(period_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::test_support::{seed_client, test_pool};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn lifecycle_open_close_reopen() {
        let pool = test_pool().await;
        let client = seed_client(&pool).await;
        let repo = BatchRepo::new(&pool);

        let batch = repo.create(client.id, "Mail 1".into(), day(), None).await.unwrap();
        assert!(batch.is_open());

        let closed = repo.close(batch.id).await.unwrap();
        assert_eq!(closed.status, BatchStatus::Closed);
        assert!(matches!(repo.close(batch.id).await, Err(DbError::Conflict(_))));
        assert!(matches!(repo.delete(batch.id).await, Err(DbError::Conflict(_))));

        let cleared = repo.toggle_cleared(batch.id).await.unwrap();
        assert!(cleared.cleared);
        assert!(matches!(repo.reopen(batch.id).await, Err(DbError::Conflict(_))));

        repo.toggle_cleared(batch.id).await.unwrap();
        assert!(repo.reopen(batch.id).await.unwrap().is_open());
        repo.delete(batch.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn empty_batch_totals_are_zero() {
        let pool = test_pool().await;
        let client = seed_client(&pool).await;
        let repo = BatchRepo::new(&pool);
        let batch = repo.create(client.id, "Empty".into(), day(), None).await.unwrap();

        let with_totals = repo.get(batch.id).await.unwrap();
        assert_eq!(with_totals.donation_count, 0);
        assert_eq!(with_totals.total_cents, Amount::ZERO);
    }
}
