//! Client policy endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use compass_core::policy::PolicyKind;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{Policy, PolicyRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::ValidationError;

#[derive(Deserialize)]
pub struct UpsertPolicyRequest {
    pub amount_cents: Option<i64>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn parse_kind(kind: &str) -> Result<PolicyKind, ValidationError> {
    kind.parse().map_err(|value| ValidationError::InvalidVariant {
        field: "policy kind",
        value,
    })
}

/// GET /clients/{id}/policies
async fn list_policies(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(client_id): ValidPath<Uuid>,
) -> Result<Json<Vec<Policy>>, ApiError> {
    Ok(Json(PolicyRepo::new(&state.pool).list_for_client(client_id).await?))
}

/// PUT /clients/{id}/policies/{kind}
async fn upsert_policy(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    ValidPath((client_id, kind)): ValidPath<(Uuid, String)>,
    Json(req): Json<UpsertPolicyRequest>,
) -> Result<Json<Policy>, ApiError> {
    let kind = parse_kind(&kind)?;
    let policy = PolicyRepo::new(&state.pool)
        .upsert(client_id, kind, req.amount_cents, req.enabled)
        .await?;

    tracing::info!(%client_id, policy = %kind, user = %session.user.email, "policy saved");
    Ok(Json(policy))
}

/// POST /clients/{id}/policies/{kind}/toggle
async fn toggle_policy(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath((client_id, kind)): ValidPath<(Uuid, String)>,
) -> Result<Json<Policy>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(PolicyRepo::new(&state.pool).toggle(client_id, kind).await?))
}

/// DELETE /clients/{id}/policies/{kind}
async fn delete_policy(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath((client_id, kind)): ValidPath<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    PolicyRepo::new(&state.pool).delete(client_id, kind).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients/{id}/policies", get(list_policies))
        .route(
            "/clients/{id}/policies/{kind}",
            put(upsert_policy).delete(delete_policy),
        )
        .route("/clients/{id}/policies/{kind}/toggle", post(toggle_policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_invalid_variant() {
        assert_eq!(parse_kind("minimum_amount"), Ok(PolicyKind::MinimumAmount));
        assert_eq!(
            parse_kind("max"),
            Err(ValidationError::InvalidVariant {
                field: "policy kind",
                value: "max".into()
            })
        );
    }

    #[test]
    fn upsert_defaults_to_enabled() {
        let req: UpsertPolicyRequest = serde_json::from_str(r#"{"amount_cents": 500}"#).unwrap();
        assert!(req.enabled);
        assert_eq!(req.amount_cents, Some(500));
    }
}
