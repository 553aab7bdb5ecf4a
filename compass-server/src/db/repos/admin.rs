//! Maintenance queries for the admin endpoints

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::DbError;

/// Domain tables reported by [`AdminRepo::stats`]
const TABLES: &[&str] = &[
    "clients",
    "users",
    "sessions",
    "donors",
    "batches",
    "donations",
    "policies",
    "reconciliation_periods",
    "bank_transactions",
    "import_runs",
];

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// Data problems worth a look; none of them are fixed automatically
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub empty_closed_batches: Vec<Uuid>,
    pub cross_client_donations: Vec<Uuid>,
    pub out_of_period_transactions: Vec<Uuid>,
    pub expired_sessions: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.empty_closed_batches.is_empty()
            && self.cross_client_donations.is_empty()
            && self.out_of_period_transactions.is_empty()
            && self.expired_sessions == 0
    }
}

pub struct AdminRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> AdminRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Row counts for every domain table.
    pub async fn stats(&self) -> Result<Vec<TableCount>, DbError> {
        let mut counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            // table names come from the constant list above
            let (rows,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(self.pool)
                .await?;
            counts.push(TableCount { table, rows });
        }
        Ok(counts)
    }

    pub async fn integrity(&self) -> Result<IntegrityReport, DbError> {
        let empty_closed_batches: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT b.id FROM batches b
            WHERE b.status = 'closed'
              AND NOT EXISTS (SELECT 1 FROM donations d WHERE d.batch_id = b.id)
            ORDER BY b.id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let cross_client_donations: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT d.id FROM donations d
            JOIN batches b ON b.id = d.batch_id
            JOIN donors r ON r.id = d.donor_id
            WHERE r.client_id <> b.client_id
            ORDER BY d.id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let out_of_period_transactions: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT t.id FROM bank_transactions t
            JOIN reconciliation_periods p ON p.id = t.period_id
            WHERE t.posted_date < p.start_date OR t.posted_date > p.end_date
            ORDER BY t.id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let (expired_sessions,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE expires_at <= NOW()")
                .fetch_one(self.pool)
                .await?;

        Ok(IntegrityReport {
            empty_closed_batches: ids(empty_closed_batches),
            cross_client_donations: ids(cross_client_donations),
            out_of_period_transactions: ids(out_of_period_transactions),
            expired_sessions,
        })
    }
}

fn ids(rows: Vec<(Uuid,)>) -> Vec<Uuid> {
    rows.into_iter().map(|(id,)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_clean() {
        let mut report = IntegrityReport::default();
        assert!(report.is_clean());
        report.expired_sessions = 2;
        assert!(!report.is_clean());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn stats_cover_every_table() {
        let pool = crate::db::repos::test_support::test_pool().await;
        let stats = AdminRepo::new(&pool).stats().await.unwrap();
        assert_eq!(stats.len(), TABLES.len());
        assert!(stats.iter().all(|c| c.rows >= 0));
    }
}
