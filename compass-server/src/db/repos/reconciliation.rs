//! Reconciliation periods and bank transactions
//!
//! A period groups closed batches and the bank credits that deposited them.
//! Once a period is closed nothing inside it may change.

use chrono::{DateTime, NaiveDate, Utc};
use compass_core::import::{BankRow, RowError};
use compass_core::reconcile::{self, Balance, MatchPair, OpenBatch, OpenTransaction};
use compass_core::Amount;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::batches::lock;
use super::{paginate, DbError, WithTotal};
use crate::models::{DateRange, Paginated, Pagination, PeriodStatus, ValidationError};

const PERIOD_COLUMNS: &str = "id, client_id, name, start_date, end_date, status, created_at, closed_at";
const TRANSACTION_COLUMNS: &str =
    "id, period_id, posted_date, amount_cents, description, reference, matched_batch_id, created_at";

/// Reconciliation period record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Period {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: PeriodStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Period {
    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Bank statement line
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankTransaction {
    pub id: Uuid,
    pub period_id: Uuid,
    pub posted_date: NaiveDate,
    #[sqlx(try_from = "i64")]
    pub amount_cents: Amount,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub matched_batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// New bank transaction, validated by the caller
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub posted_date: NaiveDate,
    pub amount: Amount,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl From<BankRow> for NewTransaction {
    fn from(row: BankRow) -> Self {
        Self {
            posted_date: row.posted_date,
            amount: row.amount,
            description: row.description,
            reference: row.reference,
        }
    }
}

/// Period with its balance and progress counts
#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    #[serde(flatten)]
    pub period: Period,
    pub balance: Balance,
    pub cleared_batches: i64,
    pub uncleared_batches: i64,
    pub matched_transactions: i64,
    pub unmatched_transactions: i64,
}

/// Outcome of a statement import
#[derive(Debug, Clone, Serialize)]
pub struct StatementImport {
    pub imported: usize,
    pub errors: Vec<RowError>,
}

/// Reconciliation repository
pub struct ReconciliationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ReconciliationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // periods
    // ------------------------------------------------------------------

    pub async fn create_period(
        &self,
        client_id: Uuid,
        name: String,
        range: DateRange,
    ) -> Result<Period, DbError> {
        let client_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)")
                .bind(client_id)
                .fetch_one(self.pool)
                .await?;
        if !client_exists.0 {
            return Err(DbError::not_found("client", client_id));
        }

        let period = sqlx::query_as(&format!(
            r#"
            INSERT INTO reconciliation_periods (client_id, name, start_date, end_date)
            VALUES ($1, $2, $3, $4)
            RETURNING {PERIOD_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(&name)
        .bind(range.start())
        .bind(range.end())
        .fetch_one(self.pool)
        .await?;

        Ok(period)
    }

    pub async fn list_periods(
        &self,
        client_id: Option<Uuid>,
        page: Pagination,
    ) -> Result<Paginated<Period>, DbError> {
        let rows: Vec<WithTotal<Period>> = sqlx::query_as(&format!(
            r#"
            SELECT {PERIOD_COLUMNS}, COUNT(*) OVER() AS total
            FROM reconciliation_periods
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY start_date DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(client_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    pub async fn get_period(&self, id: Uuid) -> Result<Period, DbError> {
        sqlx::query_as(&format!(
            "SELECT {PERIOD_COLUMNS} FROM reconciliation_periods WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("reconciliation period", id))
    }

    pub async fn summary(&self, id: Uuid) -> Result<PeriodSummary, DbError> {
        let period = self.get_period(id).await?;

        let (batch_total, cleared, uncleared): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE((SELECT SUM(d.amount_cents) FROM donations d
                          JOIN batches b ON b.id = d.batch_id
                          WHERE b.reconciliation_period_id = $1), 0)::bigint,
                COUNT(*) FILTER (WHERE cleared),
                COUNT(*) FILTER (WHERE NOT cleared)
            FROM batches
            WHERE reconciliation_period_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        let (bank_total, matched, unmatched): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount_cents), 0)::bigint,
                COUNT(*) FILTER (WHERE matched_batch_id IS NOT NULL),
                COUNT(*) FILTER (WHERE matched_batch_id IS NULL)
            FROM bank_transactions
            WHERE period_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(PeriodSummary {
            period,
            balance: reconcile::summarise(Amount::from_cents(batch_total), Amount::from_cents(bank_total)),
            cleared_batches: cleared,
            uncleared_batches: uncleared,
            matched_transactions: matched,
            unmatched_transactions: unmatched,
        })
    }

    /// Close a period once every attached batch is cleared.
    pub async fn close_period(&self, id: Uuid) -> Result<Period, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open_period(&mut tx, id).await?;

        let (uncleared,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM batches WHERE reconciliation_period_id = $1 AND NOT cleared",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if uncleared > 0 {
            return Err(DbError::conflict(format!(
                "{} batch(es) in the period are not cleared",
                uncleared
            )));
        }

        let period = set_status(&mut tx, id, PeriodStatus::Closed).await?;
        tx.commit().await?;
        tracing::info!(period_id = %id, "reconciliation period closed");
        Ok(period)
    }

    pub async fn reopen_period(&self, id: Uuid) -> Result<Period, DbError> {
        let mut tx = self.pool.begin().await?;
        let period = lock_period(&mut tx, id).await?;
        if period.is_open() {
            return Err(DbError::conflict("reconciliation period is already open"));
        }

        let period = set_status(&mut tx, id, PeriodStatus::Open).await?;
        tx.commit().await?;
        tracing::info!(period_id = %id, "reconciliation period reopened");
        Ok(period)
    }

    /// Delete an open period. Its transactions go with it; batches are released.
    pub async fn delete_period(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open_period(&mut tx, id).await?;

        let released = sqlx::query(
            "UPDATE batches SET cleared = FALSE, reconciliation_period_id = NULL WHERE reconciliation_period_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM reconciliation_periods WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(period_id = %id, released, "reconciliation period deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // batch membership
    // ------------------------------------------------------------------

    /// Attach a closed batch of the same client to an open period.
    pub async fn attach_batch(&self, period_id: Uuid, batch_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        let period = lock_open_period(&mut tx, period_id).await?;
        let batch = lock(&mut tx, batch_id).await?;

        if batch.client_id != period.client_id {
            return Err(ValidationError::OutOfRange {
                field: "batch_id",
                reason: "belongs to a different client than the period".to_owned(),
            }
            .into());
        }
        if batch.is_open() {
            return Err(DbError::conflict("only closed batches can be reconciled"));
        }
        match batch.reconciliation_period_id {
            Some(current) if current == period_id => return Ok(()),
            Some(current) => {
                return Err(DbError::conflict(format!(
                    "batch is already attached to period '{}'",
                    current
                )))
            }
            None => {}
        }

        sqlx::query("UPDATE batches SET reconciliation_period_id = $2 WHERE id = $1")
            .bind(batch_id)
            .bind(period_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Detach a batch, dropping any transaction match and its cleared flag.
    pub async fn detach_batch(&self, period_id: Uuid, batch_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open_period(&mut tx, period_id).await?;
        let batch = lock(&mut tx, batch_id).await?;

        if batch.reconciliation_period_id != Some(period_id) {
            return Err(DbError::not_found("batch in period", batch_id));
        }

        sqlx::query(
            "UPDATE bank_transactions SET matched_batch_id = NULL WHERE period_id = $1 AND matched_batch_id = $2",
        )
        .bind(period_id)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE batches SET reconciliation_period_id = NULL, cleared = FALSE WHERE id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // bank transactions
    // ------------------------------------------------------------------

    pub async fn list_transactions(
        &self,
        period_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<BankTransaction>, DbError> {
        self.get_period(period_id).await?;

        let rows: Vec<WithTotal<BankTransaction>> = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}, COUNT(*) OVER() AS total
            FROM bank_transactions
            WHERE period_id = $1
            ORDER BY posted_date, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(period_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    pub async fn add_transaction(
        &self,
        period_id: Uuid,
        new: &NewTransaction,
    ) -> Result<BankTransaction, DbError> {
        let mut tx = self.pool.begin().await?;
        let period = lock_open_period(&mut tx, period_id).await?;
        check_in_period(&period, new)?;

        let txn = insert_transaction(&mut tx, period_id, new).await?;
        tx.commit().await?;
        Ok(txn)
    }

    /// Insert statement rows; rows dated outside the period are reported, not fatal.
    pub async fn import_statement(
        &self,
        period_id: Uuid,
        rows: Vec<BankRow>,
        mut errors: Vec<RowError>,
    ) -> Result<StatementImport, DbError> {
        let mut tx = self.pool.begin().await?;
        let period = lock_open_period(&mut tx, period_id).await?;

        let mut imported = 0;
        for row in rows {
            let line = row.line;
            let new = NewTransaction::from(row);
            if let Err(e) = check_in_period(&period, &new) {
                errors.push(RowError {
                    line,
                    message: e.to_string(),
                });
                continue;
            }
            insert_transaction(&mut tx, period_id, &new).await?;
            imported += 1;
        }

        tx.commit().await?;
        errors.sort_by_key(|e| e.line);
        tracing::info!(period_id = %period_id, imported, errors = errors.len(), "bank statement imported");
        Ok(StatementImport { imported, errors })
    }

    /// Match a transaction to a batch in the same period and mark the batch cleared.
    pub async fn match_transaction(&self, id: Uuid, batch_id: Uuid) -> Result<BankTransaction, DbError> {
        let mut tx = self.pool.begin().await?;
        let txn = lock_transaction_in_open_period(&mut tx, id).await?;
        let batch = lock(&mut tx, batch_id).await?;

        if batch.reconciliation_period_id != Some(txn.period_id) {
            return Err(DbError::conflict("batch is not attached to this period"));
        }
        let (taken,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM bank_transactions WHERE matched_batch_id = $1 AND id <> $2)",
        )
        .bind(batch_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(DbError::conflict("batch is already matched to another transaction"));
        }

        if let Some(previous) = txn.matched_batch_id.filter(|b| *b != batch_id) {
            set_cleared(&mut tx, previous, false).await?;
        }
        let txn = set_match(&mut tx, id, Some(batch_id)).await?;
        set_cleared(&mut tx, batch_id, true).await?;

        tx.commit().await?;
        Ok(txn)
    }

    pub async fn unmatch_transaction(&self, id: Uuid) -> Result<BankTransaction, DbError> {
        let mut tx = self.pool.begin().await?;
        let txn = lock_transaction_in_open_period(&mut tx, id).await?;

        if let Some(batch_id) = txn.matched_batch_id {
            set_cleared(&mut tx, batch_id, false).await?;
        }
        let txn = set_match(&mut tx, id, None).await?;

        tx.commit().await?;
        Ok(txn)
    }

    pub async fn delete_transaction(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        let txn = lock_transaction_in_open_period(&mut tx, id).await?;

        if let Some(batch_id) = txn.matched_batch_id {
            set_cleared(&mut tx, batch_id, false).await?;
        }
        sqlx::query("DELETE FROM bank_transactions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Pair unmatched credits with uncleared batches of equal total.
    pub async fn auto_match(&self, period_id: Uuid) -> Result<Vec<MatchPair>, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_open_period(&mut tx, period_id).await?;

        let transactions: Vec<(Uuid, NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT id, posted_date, amount_cents
            FROM bank_transactions
            WHERE period_id = $1 AND matched_batch_id IS NULL
            FOR UPDATE
            "#,
        )
        .bind(period_id)
        .fetch_all(&mut *tx)
        .await?;

        let batches: Vec<(Uuid, NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT b.id, b.batch_date, COALESCE(SUM(d.amount_cents), 0)::bigint
            FROM batches b
            LEFT JOIN donations d ON d.batch_id = b.id
            WHERE b.reconciliation_period_id = $1
              AND NOT b.cleared
              AND NOT EXISTS (SELECT 1 FROM bank_transactions t WHERE t.matched_batch_id = b.id)
            GROUP BY b.id
            "#,
        )
        .bind(period_id)
        .fetch_all(&mut *tx)
        .await?;

        let open_txns: Vec<OpenTransaction> = transactions
            .into_iter()
            .map(|(id, posted_date, cents)| OpenTransaction {
                id,
                posted_date,
                amount: Amount::from_cents(cents),
            })
            .collect();
        let open_batches: Vec<OpenBatch> = batches
            .into_iter()
            .map(|(id, batch_date, cents)| OpenBatch {
                id,
                batch_date,
                total: Amount::from_cents(cents),
            })
            .collect();

        let pairs = reconcile::auto_match(&open_txns, &open_batches);
        for pair in &pairs {
            set_match(&mut tx, pair.transaction_id, Some(pair.batch_id)).await?;
            set_cleared(&mut tx, pair.batch_id, true).await?;
        }

        tx.commit().await?;
        tracing::info!(period_id = %period_id, matched = pairs.len(), "auto-match complete");
        Ok(pairs)
    }
}

async fn lock_period(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Period, DbError> {
    sqlx::query_as(&format!(
        "SELECT {PERIOD_COLUMNS} FROM reconciliation_periods WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| DbError::not_found("reconciliation period", id))
}

async fn lock_open_period(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Period, DbError> {
    let period = lock_period(tx, id).await?;
    if !period.is_open() {
        return Err(DbError::conflict(format!(
            "reconciliation period '{}' is closed",
            id
        )));
    }
    Ok(period)
}

async fn lock_transaction(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<BankTransaction, DbError> {
    sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| DbError::not_found("bank transaction", id))
}

/// Lock a transaction's period, then the transaction itself.
///
/// Every reconciliation write takes the period lock first; taking the
/// transaction row first would invert the order used by `auto_match`.
async fn lock_transaction_in_open_period(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<BankTransaction, DbError> {
    let period_id: Option<(Uuid,)> =
        sqlx::query_as("SELECT period_id FROM bank_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
    let Some((period_id,)) = period_id else {
        return Err(DbError::not_found("bank transaction", id));
    };

    lock_open_period(tx, period_id).await?;
    // not found when deleted while we waited on the period
    lock_transaction(tx, id).await
}

async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: PeriodStatus,
) -> Result<Period, DbError> {
    let period = sqlx::query_as(&format!(
        r#"
        UPDATE reconciliation_periods
        SET status = $2,
            closed_at = CASE WHEN $2 = 'closed' THEN NOW() ELSE NULL END
        WHERE id = $1
        RETURNING {PERIOD_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_one(&mut **tx)
    .await?;
    Ok(period)
}

async fn set_match(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    batch_id: Option<Uuid>,
) -> Result<BankTransaction, DbError> {
    let txn = sqlx::query_as(&format!(
        "UPDATE bank_transactions SET matched_batch_id = $2 WHERE id = $1 RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(id)
    .bind(batch_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(txn)
}

async fn set_cleared(tx: &mut Transaction<'_, Postgres>, batch_id: Uuid, cleared: bool) -> Result<(), DbError> {
    sqlx::query("UPDATE batches SET cleared = $2 WHERE id = $1")
        .bind(batch_id)
        .bind(cleared)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    period_id: Uuid,
    new: &NewTransaction,
) -> Result<BankTransaction, DbError> {
    let txn = sqlx::query_as(&format!(
        r#"
        INSERT INTO bank_transactions (period_id, posted_date, amount_cents, description, reference)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(period_id)
    .bind(new.posted_date)
    .bind(new.amount.cents())
    .bind(&new.description)
    .bind(&new.reference)
    .fetch_one(&mut **tx)
    .await?;
    Ok(txn)
}

fn check_in_period(period: &Period, new: &NewTransaction) -> Result<(), ValidationError> {
    if new.amount == Amount::ZERO {
        return Err(ValidationError::OutOfRange {
            field: "amount",
            reason: "must not be zero".to_owned(),
        });
    }
    if !period.contains(new.posted_date) {
        return Err(ValidationError::OutOfRange {
            field: "posted_date",
            reason: format!(
                "{} is outside the period {}..{}",
                new.posted_date, period.start_date, period.end_date
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn period() -> Period {
        Period {
            id: Uuid::nil(),
            client_id: Uuid::nil(),
            name: "June".into(),
            start_date: d(6, 1),
            end_date: d(6, 30),
            status: PeriodStatus::Open,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    fn txn(date: NaiveDate, cents: i64) -> NewTransaction {
        NewTransaction {
            posted_date: date,
            amount: Amount::from_cents(cents),
            description: None,
            reference: None,
        }
    }

    #[test]
    fn transaction_date_must_fall_in_period() {
        assert!(check_in_period(&period(), &txn(d(6, 30), 100)).is_ok());
        let err = check_in_period(&period(), &txn(d(7, 1), 100)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "posted_date 2024-07-01 is outside the period 2024-06-01..2024-06-30"
        );
    }

    #[test]
    fn zero_amount_rejected() {
        assert!(check_in_period(&period(), &txn(d(6, 2), 0)).is_err());
        assert!(check_in_period(&period(), &txn(d(6, 2), -500)).is_ok());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn auto_match_clears_batches_and_closing_locks_period() {
        use crate::db::repos::test_support::{seed_client, test_pool};
        use crate::db::repos::{BatchRepo, DonationRepo};
        use crate::models::DonationFields;
        use compass_core::PaymentMethod;

        let pool = test_pool().await;
        let client = seed_client(&pool).await;
        let batches = BatchRepo::new(&pool);
        let batch = batches.create(client.id, "June 3".into(), d(6, 3), None).await.unwrap();
        DonationRepo::new(&pool)
            .create(
                batch.id,
                &DonationFields {
                    donor_id: None,
                    amount: Amount::from_cents(12_500),
                    method: PaymentMethod::Cash,
                    check_number: None,
                    received_date: d(6, 3),
                    notes: None,
                },
            )
            .await
            .unwrap();
        batches.close(batch.id).await.unwrap();

        let repo = ReconciliationRepo::new(&pool);
        let period = repo
            .create_period(client.id, "June".into(), DateRange::new(d(6, 1), d(6, 30)).unwrap())
            .await
            .unwrap();
        repo.attach_batch(period.id, batch.id).await.unwrap();
        assert!(matches!(repo.close_period(period.id).await, Err(DbError::Conflict(_))));

        let credit = repo.add_transaction(period.id, &txn(d(6, 4), 12_500)).await.unwrap();
        let pairs = repo.auto_match(period.id).await.unwrap();
        assert_eq!(pairs, vec![MatchPair { transaction_id: credit.id, batch_id: batch.id }]);

        let summary = repo.summary(period.id).await.unwrap();
        assert!(summary.balance.balanced);
        assert_eq!(summary.cleared_batches, 1);

        repo.close_period(period.id).await.unwrap();
        assert!(matches!(
            repo.add_transaction(period.id, &txn(d(6, 5), 100)).await,
            Err(DbError::Conflict(_))
        ));
    }

    mod with_database {
        use super::*;
        use crate::db::repos::test_support::{seed_client, test_pool};
        use crate::db::repos::{BatchRepo, Client, DonationRepo};
        use crate::models::DonationFields;
        use compass_core::PaymentMethod;

        /// Closed batch holding one cash donation of `cents`.
        async fn closed_batch(pool: &PgPool, client: &Client, cents: i64) -> Uuid {
            let batches = BatchRepo::new(pool);
            let batch = batches.create(client.id, "Deposit".into(), d(6, 3), None).await.unwrap();
            DonationRepo::new(pool)
                .create(
                    batch.id,
                    &DonationFields {
                        donor_id: None,
                        amount: Amount::from_cents(cents),
                        method: PaymentMethod::Cash,
                        check_number: None,
                        received_date: d(6, 3),
                        notes: None,
                    },
                )
                .await
                .unwrap();
            batches.close(batch.id).await.unwrap();
            batch.id
        }

        async fn june(pool: &PgPool, client: &Client) -> Period {
            ReconciliationRepo::new(pool)
                .create_period(client.id, "June".into(), DateRange::new(d(6, 1), d(6, 30)).unwrap())
                .await
                .unwrap()
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn detach_unmatches_and_unclears() {
            let pool = test_pool().await;
            let client = seed_client(&pool).await;
            let batch_id = closed_batch(&pool, &client, 4_000).await;
            let repo = ReconciliationRepo::new(&pool);
            let period = june(&pool, &client).await;

            repo.attach_batch(period.id, batch_id).await.unwrap();
            let credit = repo.add_transaction(period.id, &txn(d(6, 4), 4_000)).await.unwrap();
            repo.match_transaction(credit.id, batch_id).await.unwrap();
            assert!(BatchRepo::new(&pool).get(batch_id).await.unwrap().batch.cleared);

            repo.detach_batch(period.id, batch_id).await.unwrap();

            let batch = BatchRepo::new(&pool).get(batch_id).await.unwrap().batch;
            assert!(!batch.cleared);
            assert_eq!(batch.reconciliation_period_id, None);
            let txns = repo.list_transactions(period.id, Pagination::default()).await.unwrap();
            assert_eq!(txns.items[0].matched_batch_id, None);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn deleting_period_releases_cleared_batches() {
            let pool = test_pool().await;
            let client = seed_client(&pool).await;
            let batch_id = closed_batch(&pool, &client, 2_500).await;
            let repo = ReconciliationRepo::new(&pool);
            let period = june(&pool, &client).await;

            repo.attach_batch(period.id, batch_id).await.unwrap();
            let credit = repo.add_transaction(period.id, &txn(d(6, 4), 2_500)).await.unwrap();
            repo.match_transaction(credit.id, batch_id).await.unwrap();

            repo.delete_period(period.id).await.unwrap();

            let batches = BatchRepo::new(&pool);
            let batch = batches.get(batch_id).await.unwrap().batch;
            assert!(!batch.cleared);
            assert_eq!(batch.reconciliation_period_id, None);
            assert!(batches.reopen(batch_id).await.unwrap().is_open());
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn matched_batch_cannot_be_uncleared_directly() {
            let pool = test_pool().await;
            let client = seed_client(&pool).await;
            let batch_id = closed_batch(&pool, &client, 900).await;
            let repo = ReconciliationRepo::new(&pool);
            let period = june(&pool, &client).await;

            repo.attach_batch(period.id, batch_id).await.unwrap();
            let credit = repo.add_transaction(period.id, &txn(d(6, 4), 900)).await.unwrap();
            repo.match_transaction(credit.id, batch_id).await.unwrap();

            let batches = BatchRepo::new(&pool);
            assert!(matches!(batches.toggle_cleared(batch_id).await, Err(DbError::Conflict(_))));

            repo.unmatch_transaction(credit.id).await.unwrap();
            assert!(!batches.get(batch_id).await.unwrap().batch.cleared);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn concurrent_match_and_auto_match_finish_cleanly() {
            let pool = test_pool().await;
            let client = seed_client(&pool).await;
            let period = june(&pool, &client).await;

            for round in 0..25i64 {
                let cents = 10_000 + round;
                let batch_id = closed_batch(&pool, &client, cents).await;
                let repo = ReconciliationRepo::new(&pool);
                repo.attach_batch(period.id, batch_id).await.unwrap();
                let credit = repo.add_transaction(period.id, &txn(d(6, 4), cents)).await.unwrap();

                let manual = {
                    let pool = pool.clone();
                    tokio::spawn(async move {
                        ReconciliationRepo::new(&pool).match_transaction(credit.id, batch_id).await
                    })
                };
                let auto = {
                    let pool = pool.clone();
                    let period_id = period.id;
                    tokio::spawn(async move { ReconciliationRepo::new(&pool).auto_match(period_id).await })
                };

                match manual.await.unwrap() {
                    Ok(_) | Err(DbError::Conflict(_)) => {}
                    Err(e) => panic!("round {round}: match failed: {e}"),
                }
                if let Err(e) = auto.await.unwrap() {
                    panic!("round {round}: auto-match failed: {e}");
                }

                let batch = BatchRepo::new(&pool).get(batch_id).await.unwrap().batch;
                assert!(batch.cleared, "round {round}: batch left uncleared");
            }

            let summary = ReconciliationRepo::new(&pool).summary(period.id).await.unwrap();
            assert_eq!(summary.unmatched_transactions, 0);
            assert_eq!(summary.cleared_batches, 25);
        }
    }
}
