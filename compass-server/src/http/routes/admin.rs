//! Admin and maintenance endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::migrate::{self, MigrationStatus};
use crate::db::repos::{AdminRepo, IntegrityReport, TableCount, UserRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AdminSession;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

/// GET /admin/stats
async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminSession,
) -> Result<Json<Vec<TableCount>>, ApiError> {
    Ok(Json(AdminRepo::new(&state.pool).stats().await?))
}

/// GET /admin/migrations
async fn migrations(
    State(state): State<Arc<AppState>>,
    _admin: AdminSession,
) -> Result<Json<Vec<MigrationStatus>>, ApiError> {
    let status = migrate::status(&state.pool).await.map_err(|e| ApiError::Internal {
        message: format!("migration status: {}", e),
    })?;
    Ok(Json(status))
}

/// GET /admin/integrity
async fn integrity(
    State(state): State<Arc<AppState>>,
    _admin: AdminSession,
) -> Result<Json<IntegrityReport>, ApiError> {
    let report = AdminRepo::new(&state.pool).integrity().await?;
    if !report.is_clean() {
        tracing::warn!(
            empty_closed_batches = report.empty_closed_batches.len(),
            cross_client_donations = report.cross_client_donations.len(),
            out_of_period_transactions = report.out_of_period_transactions.len(),
            expired_sessions = report.expired_sessions,
            "integrity check found issues"
        );
    }
    Ok(Json(report))
}

/// POST /admin/sessions/purge
async fn purge_sessions(
    State(state): State<Arc<AppState>>,
    AdminSession(admin): AdminSession,
) -> Result<Json<PurgeResponse>, ApiError> {
    let purged = UserRepo::new(&state.pool).purge_expired().await?;
    tracing::info!(purged, user = %admin.email, "expired sessions purged");
    Ok(Json(PurgeResponse { purged }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/migrations", get(migrations))
        .route("/admin/integrity", get(integrity))
        .route("/admin/sessions/purge", post(purge_sessions))
}
