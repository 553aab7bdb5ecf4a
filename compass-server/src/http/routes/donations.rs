//! Donation endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use crate::db::repos::{Donation, DonationRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::{DonationInput, DonationPatch, Paginated, Pagination, PaginationParams};

/// GET /batches/{id}/donations
async fn list_donations(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(batch_id): ValidPath<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Donation>>, ApiError> {
    let donations = DonationRepo::new(&state.pool)
        .list_for_batch(batch_id, Pagination::from(params))
        .await?;
    Ok(Json(donations))
}

/// POST /batches/{id}/donations
async fn create_donation(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(batch_id): ValidPath<Uuid>,
    Json(req): Json<DonationInput>,
) -> Result<(StatusCode, Json<Donation>), ApiError> {
    let fields = req.validate()?;
    let donation = DonationRepo::new(&state.pool).create(batch_id, &fields).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

/// PATCH /donations/{id}
async fn update_donation(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(patch): Json<DonationPatch>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(DonationRepo::new(&state.pool).update(id, patch).await?))
}

/// DELETE /donations/{id}
async fn delete_donation(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    DonationRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Donation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/batches/{id}/donations",
            get(list_donations).post(create_donation),
        )
        .route("/donations/{id}", patch(update_donation).delete(delete_donation))
}
