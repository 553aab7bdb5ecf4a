//! Donation repository
//!
//! Every write locks the parent batch row so a batch cannot be closed while
//! a donation is being added to it.

use chrono::{DateTime, NaiveDate, Utc};
use compass_core::policy::{evaluate, DonationDraft};
use compass_core::{Amount, PaymentMethod};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::batches::lock_open;
use super::policies::load_rules;
use super::{paginate, DbError, WithTotal};
use crate::models::{DonationFields, DonationPatch, Paginated, Pagination, ValidationError};

const DONATION_COLUMNS: &str =
    "id, batch_id, donor_id, amount_cents, method, check_number, received_date, notes, created_at";

/// Donation record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Donation {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub donor_id: Option<Uuid>,
    #[sqlx(try_from = "i64")]
    pub amount_cents: Amount,
    #[sqlx(try_from = "String")]
    pub method: PaymentMethod,
    pub check_number: Option<String>,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    pub fn fields(&self) -> DonationFields {
        DonationFields {
            donor_id: self.donor_id,
            amount: self.amount_cents,
            method: self.method,
            check_number: self.check_number.clone(),
            received_date: self.received_date,
            notes: self.notes.clone(),
        }
    }
}

/// A donor's giving history
#[derive(Debug, Clone, Serialize)]
pub struct DonorHistory {
    pub donor_id: Uuid,
    pub donation_count: i64,
    pub lifetime_total_cents: Amount,
    pub donations: Paginated<Donation>,
}

/// Donation repository
pub struct DonationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> DonationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add a donation to an open batch after checking donor and client policies.
    pub async fn create(&self, batch_id: Uuid, fields: &DonationFields) -> Result<Donation, DbError> {
        let mut tx = self.pool.begin().await?;
        let batch = lock_open(&mut tx, batch_id).await?;
        let rules = load_rules(&mut tx, batch.client_id).await?;

        check_donor(&mut tx, batch.client_id, fields.donor_id).await?;
        check_policies(&rules, fields)?;
        let donation = insert(&mut tx, batch_id, fields).await?;

        tx.commit().await?;
        Ok(donation)
    }

    pub async fn get(&self, id: Uuid) -> Result<Donation, DbError> {
        sqlx::query_as(&format!("SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("donation", id))
    }

    /// Donations of a batch in entry order.
    pub async fn list_for_batch(
        &self,
        batch_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Donation>, DbError> {
        let batch_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM batches WHERE id = $1)")
                .bind(batch_id)
                .fetch_one(self.pool)
                .await?;
        if !batch_exists.0 {
            return Err(DbError::not_found("batch", batch_id));
        }

        let rows: Vec<WithTotal<Donation>> = sqlx::query_as(&format!(
            r#"
            SELECT {DONATION_COLUMNS}, COUNT(*) OVER() AS total
            FROM donations
            WHERE batch_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(batch_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    /// Apply a partial update. The batch must still be open.
    pub async fn update(&self, id: Uuid, patch: DonationPatch) -> Result<Donation, DbError> {
        let current = self.get(id).await?;

        let mut tx = self.pool.begin().await?;
        let batch = lock_open(&mut tx, current.batch_id).await?;
        let fields = current.fields().apply_patch(patch)?;
        let rules = load_rules(&mut tx, batch.client_id).await?;

        check_donor(&mut tx, batch.client_id, fields.donor_id).await?;
        check_policies(&rules, &fields)?;

        let donation = sqlx::query_as(&format!(
            r#"
            UPDATE donations SET
                donor_id = $2, amount_cents = $3, method = $4,
                check_number = $5, received_date = $6, notes = $7
            WHERE id = $1
            RETURNING {DONATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fields.donor_id)
        .bind(fields.amount.cents())
        .bind(fields.method.as_str())
        .bind(&fields.check_number)
        .bind(fields.received_date)
        .bind(&fields.notes)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("donation", id))?;

        tx.commit().await?;
        Ok(donation)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let current = self.get(id).await?;

        let mut tx = self.pool.begin().await?;
        lock_open(&mut tx, current.batch_id).await?;

        sqlx::query("DELETE FROM donations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Donations given by a donor, newest first, with lifetime totals.
    pub async fn history_for_donor(
        &self,
        donor_id: Uuid,
        page: Pagination,
    ) -> Result<DonorHistory, DbError> {
        let totals: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT COUNT(d.id), COALESCE(SUM(d.amount_cents), 0)::bigint
            FROM donors r
            LEFT JOIN donations d ON d.donor_id = r.id
            WHERE r.id = $1
            GROUP BY r.id
            "#,
        )
        .bind(donor_id)
        .fetch_optional(self.pool)
        .await?;

        let Some((donation_count, lifetime_total)) = totals else {
            return Err(DbError::not_found("donor", donor_id));
        };

        let rows: Vec<WithTotal<Donation>> = sqlx::query_as(&format!(
            r#"
            SELECT {DONATION_COLUMNS}, COUNT(*) OVER() AS total
            FROM donations
            WHERE donor_id = $1
            ORDER BY received_date DESC, created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(donor_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(DonorHistory {
            donor_id,
            donation_count,
            lifetime_total_cents: Amount::from_cents(lifetime_total),
            donations: paginate(rows, page),
        })
    }
}

/// Insert inside an existing transaction (shared with the import pipeline).
pub(crate) async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    batch_id: Uuid,
    fields: &DonationFields,
) -> Result<Donation, DbError> {
    let donation = sqlx::query_as(&format!(
        r#"
        INSERT INTO donations (batch_id, donor_id, amount_cents, method,
                               check_number, received_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {DONATION_COLUMNS}
        "#
    ))
    .bind(batch_id)
    .bind(fields.donor_id)
    .bind(fields.amount.cents())
    .bind(fields.method.as_str())
    .bind(&fields.check_number)
    .bind(fields.received_date)
    .bind(&fields.notes)
    .fetch_one(&mut **tx)
    .await?;

    Ok(donation)
}

/// Evaluate client rules against a donation.
pub(crate) fn check_policies(
    rules: &[compass_core::policy::PolicyRule],
    fields: &DonationFields,
) -> Result<(), DbError> {
    let violations = evaluate(
        rules,
        &DonationDraft {
            amount: fields.amount,
            method: fields.method,
            check_number: fields.check_number.as_deref(),
            has_donor: fields.donor_id.is_some(),
        },
    );
    if violations.is_empty() {
        Ok(())
    } else {
        Err(DbError::Policy(violations))
    }
}

/// A linked donor must exist and belong to the batch's client.
async fn check_donor(
    tx: &mut Transaction<'_, Postgres>,
    client_id: Uuid,
    donor_id: Option<Uuid>,
) -> Result<(), DbError> {
    let Some(donor_id) = donor_id else {
        return Ok(());
    };

    let owner: Option<(Uuid,)> = sqlx::query_as("SELECT client_id FROM donors WHERE id = $1")
        .bind(donor_id)
        .fetch_optional(&mut **tx)
        .await?;

    match owner {
        None => Err(DbError::not_found("donor", donor_id)),
        Some((owner,)) if owner != client_id => Err(ValidationError::OutOfRange {
            field: "donor_id",
            reason: "belongs to a different client than the batch".to_owned(),
        }
        .into()),
        Some(_) => Ok(()),
    }
}
