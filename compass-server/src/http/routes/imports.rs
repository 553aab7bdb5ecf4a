//! Donation CSV import endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use compass_core::import::parse_donations;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{ImportRepo, ImportReport, ImportRun};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;

#[derive(Deserialize)]
pub struct ImportParams {
    /// Original file name, recorded on the run
    pub source: Option<String>,
}

/// POST /batches/{id}/import - CSV request body
async fn import_csv(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    ValidPath(batch_id): ValidPath<Uuid>,
    Query(params): Query<ImportParams>,
    body: String,
) -> Result<Json<ImportReport>, ApiError> {
    let parsed = parse_donations(body.as_bytes())?;
    let report = ImportRepo::new(&state.pool)
        .run(batch_id, parsed, params.source, Some(session.user.id))
        .await?;
    Ok(Json(report))
}

/// GET /batches/{id}/imports
async fn list_imports(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(batch_id): ValidPath<Uuid>,
) -> Result<Json<Vec<ImportRun>>, ApiError> {
    Ok(Json(ImportRepo::new(&state.pool).list_for_batch(batch_id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches/{id}/import", post(import_csv))
        .route("/batches/{id}/imports", get(list_imports))
}
