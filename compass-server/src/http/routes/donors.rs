//! Donor endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use compass_core::matching::{find_duplicates, DuplicateMatch};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{DonationRepo, Donor, DonorFilter, DonorHistory, DonorRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::{DonorInput, DonorPatch, Paginated, Pagination, PaginationParams};

/// Create body, also used as the duplicate-check candidate
#[derive(Deserialize)]
pub struct DonorRequest {
    pub client_id: Uuid,
    #[serde(flatten)]
    pub donor: DonorInput,
}

#[derive(Deserialize)]
pub struct DonorSearchParams {
    pub client_id: Option<Uuid>,
    pub q: Option<String>,
}

/// GET /donors?client_id&q
async fn list_donors(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Query(search): Query<DonorSearchParams>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Donor>>, ApiError> {
    let filter = DonorFilter {
        client_id: search.client_id,
        q: search.q,
    };
    let donors = DonorRepo::new(&state.pool)
        .list(&filter, Pagination::from(params))
        .await?;
    Ok(Json(donors))
}

/// POST /donors
async fn create_donor(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Json(req): Json<DonorRequest>,
) -> Result<(StatusCode, Json<Donor>), ApiError> {
    let fields = req.donor.validate()?;
    let donor = DonorRepo::new(&state.pool).create(req.client_id, &fields).await?;
    Ok((StatusCode::CREATED, Json(donor)))
}

/// GET /donors/{id}
async fn get_donor(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Donor>, ApiError> {
    Ok(Json(DonorRepo::new(&state.pool).get(id).await?))
}

/// PATCH /donors/{id}
async fn update_donor(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(patch): Json<DonorPatch>,
) -> Result<Json<Donor>, ApiError> {
    let repo = DonorRepo::new(&state.pool);
    let fields = repo.get(id).await?.fields().apply_patch(patch)?;
    Ok(Json(repo.update(id, &fields).await?))
}

/// DELETE /donors/{id} - 409 while donations reference the donor
async fn delete_donor(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    DonorRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /donors/{id}/toggle-do-not-mail
async fn toggle_do_not_mail(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Donor>, ApiError> {
    Ok(Json(DonorRepo::new(&state.pool).toggle_do_not_mail(id).await?))
}

/// GET /donors/{id}/donations
async fn donor_history(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<DonorHistory>, ApiError> {
    let history = DonationRepo::new(&state.pool)
        .history_for_donor(id, Pagination::from(params))
        .await?;
    Ok(Json(history))
}

/// POST /donors/duplicates - possible existing records for a candidate donor
async fn find_duplicate_donors(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Json(req): Json<DonorRequest>,
) -> Result<Json<Vec<DuplicateMatch>>, ApiError> {
    let candidate = req.donor.profile();
    let existing = DonorRepo::new(&state.pool)
        .duplicate_candidates(req.client_id, &candidate)
        .await?;

    let matches = find_duplicates(
        &candidate,
        &existing,
        state.matching.duplicate_threshold,
        state.matching.max_candidates,
    );
    tracing::debug!(
        client_id = %req.client_id,
        scanned = existing.len(),
        matched = matches.len(),
        "duplicate check"
    );
    Ok(Json(matches))
}

/// Donor routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donors", get(list_donors).post(create_donor))
        .route("/donors/duplicates", post(find_duplicate_donors))
        .route(
            "/donors/{id}",
            get(get_donor).patch(update_donor).delete(delete_donor),
        )
        .route("/donors/{id}/toggle-do-not-mail", post(toggle_do_not_mail))
        .route("/donors/{id}/donations", get(donor_history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donor_request_flattens_fields() {
        let req: DonorRequest = serde_json::from_str(
            r#"{"client_id":"00000000-0000-0000-0000-000000000001","last_name":"Lovelace","email":"ada@example.org"}"#,
        )
        .unwrap();
        assert_eq!(req.client_id, Uuid::from_u128(1));
        assert_eq!(req.donor.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(req.donor.profile().email.as_deref(), Some("ada@example.org"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicates_endpoint_finds_existing_donor() {
        use axum::body::{to_bytes, Body};
        use axum::http::Request;
        use chrono::Duration;
        use compass_core::config::MatchingSection;
        use tower::ServiceExt;

        use crate::db::repos::test_support::{seed_client, test_pool};
        use crate::db::repos::UserRepo;
        use crate::http::{build_router, ServerConfig};
        use crate::models::{DonorFields, Role};

        let pool = test_pool().await;
        let client = seed_client(&pool).await;
        let existing = DonorRepo::new(&pool)
            .create(
                client.id,
                &DonorFields {
                    first_name: Some("Ada".into()),
                    last_name: "Lovelace".into(),
                    email: Some("ada@example.org".into()),
                    phone: None,
                    address1: None,
                    city: None,
                    state: None,
                    postal_code: Some("02139".into()),
                },
            )
            .await
            .unwrap();

        let users = UserRepo::new(&pool);
        let user = users
            .create(&format!("op-{}@example.org", Uuid::new_v4().simple()), "Operator", Role::Operator)
            .await
            .unwrap();
        let issued = users.issue_session(user.id, Duration::hours(1)).await.unwrap();

        let state = Arc::new(AppState::new(pool, MatchingSection::default()));
        let app = build_router(state, &ServerConfig::default());
        let body = serde_json::json!({
            "client_id": client.id,
            "first_name": "ada",
            "last_name": "Lovelace",
            "postal_code": "02139-4307",
        });
        let request = Request::post("/api/donors/duplicates")
            .header("authorization", format!("Bearer {}", issued.token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let matches: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let ids: Vec<&str> = matches
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["donor_id"].as_str())
            .collect();
        assert!(ids.contains(&existing.id.to_string().as_str()), "{matches}");
    }
}
