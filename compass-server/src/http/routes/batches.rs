//! Batch endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{Batch, BatchFilter, BatchRepo, BatchWithTotals};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::{batch_name, BatchStatus, Paginated, Pagination, PaginationParams};

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    pub client_id: Uuid,
    pub name: String,
    pub batch_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct UpdateBatchRequest {
    pub name: Option<String>,
    pub batch_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct BatchFilterParams {
    pub client_id: Option<Uuid>,
    pub status: Option<String>,
    pub period_id: Option<Uuid>,
}

impl BatchFilterParams {
    fn into_filter(self) -> Result<BatchFilter, ApiError> {
        Ok(BatchFilter {
            client_id: self.client_id,
            status: self.status.map(BatchStatus::try_from).transpose()?,
            period_id: self.period_id,
        })
    }
}

/// GET /batches?client_id&status&period_id
async fn list_batches(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Query(filter): Query<BatchFilterParams>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<BatchWithTotals>>, ApiError> {
    let batches = BatchRepo::new(&state.pool)
        .list(&filter.into_filter()?, Pagination::from(params))
        .await?;
    Ok(Json(batches))
}

/// POST /batches
async fn create_batch(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<Batch>), ApiError> {
    let name = batch_name(&req.name)?;
    let batch = BatchRepo::new(&state.pool)
        .create(req.client_id, name, req.batch_date, Some(session.user.id))
        .await?;

    tracing::info!(batch_id = %batch.id, client_id = %batch.client_id, "batch created");
    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /batches/{id}
async fn get_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<BatchWithTotals>, ApiError> {
    Ok(Json(BatchRepo::new(&state.pool).get(id).await?))
}

/// PATCH /batches/{id} - open batches only
async fn update_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(req): Json<UpdateBatchRequest>,
) -> Result<Json<Batch>, ApiError> {
    let name = req.name.as_deref().map(batch_name).transpose()?;
    let batch = BatchRepo::new(&state.pool)
        .update(id, name, req.batch_date)
        .await?;
    Ok(Json(batch))
}

/// POST /batches/{id}/close
async fn close_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(BatchRepo::new(&state.pool).close(id).await?))
}

/// POST /batches/{id}/reopen
async fn reopen_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(BatchRepo::new(&state.pool).reopen(id).await?))
}

/// POST /batches/{id}/toggle-cleared
async fn toggle_cleared(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(BatchRepo::new(&state.pool).toggle_cleared(id).await?))
}

/// DELETE /batches/{id} - open batches only, donations go with it
async fn delete_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    BatchRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Batch routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches", get(list_batches).post(create_batch))
        .route(
            "/batches/{id}",
            get(get_batch).patch(update_batch).delete(delete_batch),
        )
        .route("/batches/{id}/close", post(close_batch))
        .route("/batches/{id}/reopen", post(reopen_batch))
        .route("/batches/{id}/toggle-cleared", post(toggle_cleared))
}
