//! Donor repository

use chrono::{DateTime, Utc};
use compass_core::matching::{normalize_postal, DonorProfile};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{paginate, DbError, WithTotal};
use crate::models::{DonorFields, Paginated, Pagination};

const DONOR_COLUMNS: &str = "id, client_id, first_name, last_name, email, phone, address1, \
                             city, state, postal_code, do_not_mail, created_at, updated_at";

/// Donor record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Donor {
    pub id: Uuid,
    pub client_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub do_not_mail: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donor {
    pub fn fields(&self) -> DonorFields {
        DonorFields {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address1: self.address1.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
        }
    }

    pub fn profile(&self) -> DonorProfile {
        DonorProfile {
            first_name: self.first_name.clone(),
            last_name: Some(self.last_name.clone()),
            email: self.email.clone(),
            postal_code: self.postal_code.clone(),
            address1: self.address1.clone(),
        }
    }
}

/// Donor list filters
#[derive(Debug, Clone, Default)]
pub struct DonorFilter {
    pub client_id: Option<Uuid>,
    /// Matches name, email or postal code
    pub q: Option<String>,
}

/// Donor repository
pub struct DonorRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> DonorRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, client_id: Uuid, fields: &DonorFields) -> Result<Donor, DbError> {
        let mut tx = self.pool.begin().await?;
        let donor = insert(&mut tx, client_id, fields).await?;
        tx.commit().await?;
        Ok(donor)
    }

    pub async fn get(&self, id: Uuid) -> Result<Donor, DbError> {
        sqlx::query_as(&format!("SELECT {DONOR_COLUMNS} FROM donors WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("donor", id))
    }

    /// Search donors. `q` is matched with ILIKE against name, email and postal code.
    pub async fn list(&self, filter: &DonorFilter, page: Pagination) -> Result<Paginated<Donor>, DbError> {
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let rows: Vec<WithTotal<Donor>> = sqlx::query_as(&format!(
            r#"
            SELECT {DONOR_COLUMNS}, COUNT(*) OVER() AS total
            FROM donors
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::text IS NULL
                   OR last_name ILIKE $2
                   OR first_name ILIKE $2
                   OR (coalesce(first_name, '') || ' ' || last_name) ILIKE $2
                   OR email ILIKE $2
                   OR postal_code ILIKE $2)
            ORDER BY last_name ASC, first_name ASC NULLS FIRST, id ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.client_id)
        .bind(pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(paginate(rows, page))
    }

    /// Replace all editable fields and bump `updated_at`.
    pub async fn update(&self, id: Uuid, fields: &DonorFields) -> Result<Donor, DbError> {
        sqlx::query_as(&format!(
            r#"
            UPDATE donors SET
                first_name = $2, last_name = $3, email = $4, phone = $5,
                address1 = $6, city = $7, state = $8, postal_code = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(&fields.address1)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.postal_code)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("donor", id))
    }

    pub async fn toggle_do_not_mail(&self, id: Uuid) -> Result<Donor, DbError> {
        sqlx::query_as(&format!(
            r#"
            UPDATE donors SET do_not_mail = NOT do_not_mail, updated_at = NOW()
            WHERE id = $1
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("donor", id))
    }

    /// Delete a donor. Fails with a conflict while donations reference it.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM donors WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("donor", id));
        }
        Ok(())
    }

    /// Donors of a client that could plausibly match the candidate.
    ///
    /// Narrows by email, postal code, or last-name initial before scoring
    /// happens in memory.
    pub async fn duplicate_candidates(
        &self,
        client_id: Uuid,
        candidate: &DonorProfile,
    ) -> Result<Vec<(Uuid, DonorProfile)>, DbError> {
        let email = candidate
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        let postal = candidate.postal_code.as_deref().and_then(normalize_postal);
        let initial = candidate
            .last_name
            .as_deref()
            .and_then(|n| n.trim().chars().next())
            .map(|c| format!("{}%", escape_like(&c.to_lowercase().to_string())));

        let donors: Vec<Donor> = sqlx::query_as(&format!(
            r#"
            SELECT {DONOR_COLUMNS}
            FROM donors
            WHERE client_id = $1
              AND (($2::text IS NOT NULL AND lower(email) = $2)
                   OR ($3::text IS NOT NULL AND left(postal_code, 5) = $3)
                   OR ($4::text IS NOT NULL AND lower(last_name) LIKE $4))
            ORDER BY id
            LIMIT 500
            "#
        ))
        .bind(client_id)
        .bind(email)
        .bind(postal)
        .bind(initial)
        .fetch_all(self.pool)
        .await?;

        Ok(donors.iter().map(|d| (d.id, d.profile())).collect())
    }
}

/// Insert inside an existing transaction (shared with the import pipeline).
pub(crate) async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    client_id: Uuid,
    fields: &DonorFields,
) -> Result<Donor, DbError> {
    let client_exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)")
        .bind(client_id)
        .fetch_one(&mut **tx)
        .await?;

    if !client_exists.0 {
        return Err(DbError::not_found("client", client_id));
    }

    let donor = sqlx::query_as(&format!(
        r#"
        INSERT INTO donors (client_id, first_name, last_name, email, phone,
                            address1, city, state, postal_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {DONOR_COLUMNS}
        "#
    ))
    .bind(client_id)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(&fields.email)
    .bind(&fields.phone)
    .bind(&fields.address1)
    .bind(&fields.city)
    .bind(&fields.state)
    .bind(&fields.postal_code)
    .fetch_one(&mut **tx)
    .await?;

    Ok(donor)
}

/// Escape LIKE wildcards in user input
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::test_support::{seed_client, test_pool};
    use crate::models::DonorInput;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("smith"), "smith");
    }

    #[test]
    fn profile_carries_last_name() {
        let donor = Donor {
            id: Uuid::nil(),
            client_id: Uuid::nil(),
            first_name: None,
            last_name: "Lee".into(),
            email: None,
            phone: None,
            address1: None,
            city: None,
            state: None,
            postal_code: Some("12345".into()),
            do_not_mail: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let profile = donor.profile();
        assert_eq!(profile.last_name.as_deref(), Some("Lee"));
        assert_eq!(profile.postal_code.as_deref(), Some("12345"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn search_matches_email_and_name() {
        let pool = test_pool().await;
        let client = seed_client(&pool).await;
        let repo = DonorRepo::new(&pool);

        let fields = DonorInput {
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            email: Some("ann.lee@example.org".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let donor = repo.create(client.id, &fields).await.unwrap();

        for q in ["ann lee", "ANN.LEE@", "Lee"] {
            let page = repo
                .list(
                    &DonorFilter {
                        client_id: Some(client.id),
                        q: Some(q.into()),
                    },
                    Pagination::default(),
                )
                .await
                .unwrap();
            assert!(page.items.iter().any(|d| d.id == donor.id), "query {q}");
        }
    }
}
