//! Client endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{Client, ClientRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{AdminSession, AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::{client_name, ClientCode, Paginated, Pagination, PaginationParams};

#[derive(Deserialize)]
pub struct CreateClientRequest {
    pub code: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct RenameClientRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ClientFilterParams {
    pub active: Option<bool>,
}

/// GET /clients
async fn list_clients(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Query(filter): Query<ClientFilterParams>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Client>>, ApiError> {
    let clients = ClientRepo::new(&state.pool)
        .list(filter.active, Pagination::from(params))
        .await?;
    Ok(Json(clients))
}

/// POST /clients
async fn create_client(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    let code = ClientCode::new(&req.code)?;
    let name = client_name(&req.name)?;
    let client = ClientRepo::new(&state.pool).create(code, name).await?;

    tracing::info!(client = %client.code, user = %session.user.email, "client created");
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /clients/{id}
async fn get_client(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(ClientRepo::new(&state.pool).get(id).await?))
}

/// PATCH /clients/{id}
async fn rename_client(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(req): Json<RenameClientRequest>,
) -> Result<Json<Client>, ApiError> {
    let name = client_name(&req.name)?;
    Ok(Json(ClientRepo::new(&state.pool).rename(id, name).await?))
}

/// POST /clients/{id}/toggle-active
async fn toggle_active(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(ClientRepo::new(&state.pool).toggle_active(id).await?))
}

/// DELETE /clients/{id} - admin only; 409 while anything references the client
async fn delete_client(
    State(state): State<Arc<AppState>>,
    AdminSession(admin): AdminSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ClientRepo::new(&state.pool).delete(id).await?;
    tracing::info!(client_id = %id, user = %admin.email, "client deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Client routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{id}",
            get(get_client).patch(rename_client).delete(delete_client),
        )
        .route("/clients/{id}/toggle-active", post(toggle_active))
}
