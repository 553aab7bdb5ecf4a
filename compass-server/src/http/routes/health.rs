//! Health check endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::db::ping;
use crate::http::server::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_latency_ms: Option<u64>,
}

impl HealthResponse {
    fn new(status: &'static str, db_latency_ms: Option<u64>) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            db_latency_ms,
        }
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::new("ok", None))
}

/// GET /health/db - 503 when the database does not answer
async fn health_db(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match ping(&state.pool).await {
        Ok(latency) => {
            let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            (StatusCode::OK, Json(HealthResponse::new("ok", Some(ms))))
        }
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new("unavailable", None)),
            )
        }
    }
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
        assert!(body.db_latency_ms.is_none());
    }

    #[test]
    fn latency_omitted_when_absent() {
        let json = serde_json::to_value(HealthResponse::new("ok", None)).unwrap();
        assert!(json.get("db_latency_ms").is_none());
        let json = serde_json::to_value(HealthResponse::new("ok", Some(3))).unwrap();
        assert_eq!(json["db_latency_ms"], 3);
    }
}
