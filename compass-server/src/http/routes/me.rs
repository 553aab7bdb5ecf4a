//! Current session endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::db::repos::{SessionUser, UserRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthSession;
use crate::http::server::AppState;

/// GET /api/me
async fn me(session: AuthSession) -> Json<SessionUser> {
    Json(session.user)
}

/// POST /api/logout - revoke the presented token
async fn logout(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<StatusCode, ApiError> {
    UserRepo::new(&state.pool).revoke(session.token()).await?;
    tracing::info!(user = %session.user.email, "session revoked");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
}
