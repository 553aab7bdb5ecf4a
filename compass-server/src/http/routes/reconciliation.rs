//! Reconciliation period and bank transaction endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use compass_core::import::parse_bank_statement;
use compass_core::reconcile::MatchPair;
use compass_core::Amount;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repos::{
    BankTransaction, NewTransaction, Period, PeriodSummary, ReconciliationRepo, StatementImport,
};
use crate::http::error::ApiError;
use crate::http::extractors::{AuthSession, ValidPath};
use crate::http::server::AppState;
use crate::models::validation::{optional_text, required_text};
use crate::models::{DateRange, Paginated, Pagination, PaginationParams};

const MAX_PERIOD_NAME_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_REFERENCE_LEN: usize = 100;

#[derive(Deserialize)]
pub struct CreatePeriodRequest {
    pub client_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct PeriodFilterParams {
    pub client_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub posted_date: NaiveDate,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub reference: Option<String>,
}

#[derive(Deserialize)]
pub struct MatchRequest {
    pub batch_id: Uuid,
}

/// GET /reconciliation/periods?client_id
async fn list_periods(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Query(filter): Query<PeriodFilterParams>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Period>>, ApiError> {
    let periods = ReconciliationRepo::new(&state.pool)
        .list_periods(filter.client_id, Pagination::from(params))
        .await?;
    Ok(Json(periods))
}

/// POST /reconciliation/periods
async fn create_period(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    Json(req): Json<CreatePeriodRequest>,
) -> Result<(StatusCode, Json<Period>), ApiError> {
    let name = required_text("name", &req.name, MAX_PERIOD_NAME_LEN)?;
    let range = DateRange::new(req.start_date, req.end_date)?;
    let period = ReconciliationRepo::new(&state.pool)
        .create_period(req.client_id, name, range)
        .await?;
    Ok((StatusCode::CREATED, Json(period)))
}

/// GET /reconciliation/periods/{id} - period with balance summary
async fn get_period(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<PeriodSummary>, ApiError> {
    Ok(Json(ReconciliationRepo::new(&state.pool).summary(id).await?))
}

/// POST /reconciliation/periods/{id}/close
async fn close_period(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Period>, ApiError> {
    Ok(Json(ReconciliationRepo::new(&state.pool).close_period(id).await?))
}

/// POST /reconciliation/periods/{id}/reopen
async fn reopen_period(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Period>, ApiError> {
    Ok(Json(ReconciliationRepo::new(&state.pool).reopen_period(id).await?))
}

/// DELETE /reconciliation/periods/{id}
async fn delete_period(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ReconciliationRepo::new(&state.pool).delete_period(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reconciliation/periods/{id}/batches/{batch_id}
async fn attach_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath((period_id, batch_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    ReconciliationRepo::new(&state.pool)
        .attach_batch(period_id, batch_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /reconciliation/periods/{id}/batches/{batch_id}
async fn detach_batch(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath((period_id, batch_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    ReconciliationRepo::new(&state.pool)
        .detach_batch(period_id, batch_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /reconciliation/periods/{id}/transactions
async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<BankTransaction>>, ApiError> {
    let transactions = ReconciliationRepo::new(&state.pool)
        .list_transactions(id, Pagination::from(params))
        .await?;
    Ok(Json(transactions))
}

/// POST /reconciliation/periods/{id}/transactions
async fn create_transaction(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<BankTransaction>), ApiError> {
    let new = NewTransaction {
        posted_date: req.posted_date,
        amount: Amount::from_cents(req.amount_cents),
        description: optional_text("description", req.description.as_deref(), MAX_DESCRIPTION_LEN)?,
        reference: optional_text("reference", req.reference.as_deref(), MAX_REFERENCE_LEN)?,
    };
    let txn = ReconciliationRepo::new(&state.pool)
        .add_transaction(id, &new)
        .await?;
    Ok((StatusCode::CREATED, Json(txn)))
}

/// POST /reconciliation/periods/{id}/transactions/import - CSV request body
async fn import_statement(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    body: String,
) -> Result<Json<StatementImport>, ApiError> {
    let parsed = parse_bank_statement(body.as_bytes())?;
    let result = ReconciliationRepo::new(&state.pool)
        .import_statement(id, parsed.rows, parsed.errors)
        .await?;
    Ok(Json(result))
}

/// POST /reconciliation/periods/{id}/auto-match
async fn auto_match(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Vec<MatchPair>>, ApiError> {
    Ok(Json(ReconciliationRepo::new(&state.pool).auto_match(id).await?))
}

/// POST /bank-transactions/{id}/match
async fn match_transaction(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<BankTransaction>, ApiError> {
    let txn = ReconciliationRepo::new(&state.pool)
        .match_transaction(id, req.batch_id)
        .await?;
    Ok(Json(txn))
}

/// POST /bank-transactions/{id}/unmatch
async fn unmatch_transaction(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<BankTransaction>, ApiError> {
    Ok(Json(ReconciliationRepo::new(&state.pool).unmatch_transaction(id).await?))
}

/// DELETE /bank-transactions/{id}
async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    _session: AuthSession,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ReconciliationRepo::new(&state.pool).delete_transaction(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/reconciliation/periods",
            get(list_periods).post(create_period),
        )
        .route(
            "/reconciliation/periods/{id}",
            get(get_period).delete(delete_period),
        )
        .route("/reconciliation/periods/{id}/close", post(close_period))
        .route("/reconciliation/periods/{id}/reopen", post(reopen_period))
        .route(
            "/reconciliation/periods/{id}/batches/{batch_id}",
            post(attach_batch).delete(detach_batch),
        )
        .route(
            "/reconciliation/periods/{id}/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route(
            "/reconciliation/periods/{id}/transactions/import",
            post(import_statement),
        )
        .route("/reconciliation/periods/{id}/auto-match", post(auto_match))
        .route("/bank-transactions/{id}/match", post(match_transaction))
        .route("/bank-transactions/{id}/unmatch", post(unmatch_transaction))
        .route("/bank-transactions/{id}", delete(delete_transaction))
}
