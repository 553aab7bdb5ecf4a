//! Repository implementations for database access
//!
//! Each repository borrows the pool and follows these patterns:
//! - Totals for list operations via `COUNT(*) OVER()` (no second query)
//! - Unique and foreign-key violations surface as `DbError::Conflict`
//! - Transactions for multi-step operations

pub mod admin;
pub mod batches;
pub mod clients;
pub mod donations;
pub mod donors;
pub mod imports;
pub mod policies;
pub mod reconciliation;
pub mod users;

pub use admin::{AdminRepo, IntegrityReport, TableCount};
pub use batches::{Batch, BatchFilter, BatchRepo, BatchWithTotals};
pub use clients::{Client, ClientRepo};
pub use donations::{Donation, DonationRepo, DonorHistory};
pub use donors::{Donor, DonorFilter, DonorRepo};
pub use imports::{ImportRepo, ImportReport, ImportRun};
pub use policies::{Policy, PolicyRepo};
pub use reconciliation::{
    BankTransaction, NewTransaction, Period, PeriodSummary, ReconciliationRepo, StatementImport,
};
pub use users::{IssuedToken, SessionUser, User, UserRepo};

use compass_core::policy::PolicyViolation;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::models::{Paginated, Pagination, ValidationError};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// Row state forbids the operation (closed batch, referenced row, duplicate key)
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("policy violation: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Policy(Vec<PolicyViolation>),
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return Self::Conflict(format!(
                        "duplicate value violates {}",
                        db.constraint().unwrap_or("a unique constraint")
                    ));
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return Self::Conflict(format!(
                        "record is still referenced ({})",
                        db.constraint().unwrap_or("foreign key")
                    ));
                }
                _ => {}
            }
        }
        Self::Sqlx(e)
    }
}

/// A row plus the window-function total used for pagination
pub(crate) struct WithTotal<T> {
    pub item: T,
    pub total: i64,
}

impl<'r, T: FromRow<'r, PgRow>> FromRow<'r, PgRow> for WithTotal<T> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            item: T::from_row(row)?,
            total: row.try_get("total")?,
        })
    }
}

/// Collect `WithTotal` rows into a page
pub(crate) fn paginate<T>(rows: Vec<WithTotal<T>>, page: Pagination) -> Paginated<T> {
    let total = rows.first().map(|r| r.total).unwrap_or(0);
    page.wrap(rows.into_iter().map(|r| r.item).collect(), total)
}


#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::PgPool;
    use uuid::Uuid;

    use super::{Client, ClientRepo};
    use crate::db::{create_pool, migrate};
    use crate::models::ClientCode;

    /// Pool against `DATABASE_URL` with migrations applied.
    pub async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
        let pool = create_pool(&url).await.expect("connect to test database");
        migrate::run(&pool).await.expect("apply migrations");
        pool
    }

    /// A fresh client with a unique code.
    pub async fn seed_client(pool: &PgPool) -> Client {
        let suffix = Uuid::new_v4().simple().to_string();
        let code = ClientCode::new(&format!("t-{}", &suffix[..12])).expect("valid code");
        ClientRepo::new(pool)
            .create(code, format!("Test client {}", &suffix[..6]))
            .await
            .expect("create client")
    }
}
