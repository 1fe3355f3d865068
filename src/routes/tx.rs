use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::utils::{self, ApiJson, Pagination};
use crate::db::{Transaction, TransactionKind};
use crate::error::ApiError;
use crate::ledger::LedgerError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: Decimal,
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
    pub account: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub target_user_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub counterparty_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub fee: Option<Decimal>,
    pub total_debit: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub kind: Option<TransactionKind>,
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

fn non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

async fn get_wallet(headers: HeaderMap, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let summary = state.ledger.wallet_summary(user_id).await?;
    Ok((StatusCode::OK, Json(summary)))
}

async fn get_stats(headers: HeaderMap, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let stats = state.ledger.wallet_stats(user_id).await?;
    Ok((StatusCode::OK, Json(stats)))
}

async fn top_up(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TopUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    non_blank("method", &req.method)?;
    tracing::info!("top-up of {} requested by user {user_id}", req.amount);

    let tx = state.ledger.top_up(user_id, req.amount, req.method.trim()).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn withdraw(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<WithdrawRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    non_blank("account", &req.account)?;
    tracing::info!("withdrawal of {} requested by user {user_id}", req.amount);

    let tx = state.ledger.withdraw(user_id, req.amount, req.account.trim()).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn transfer(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    tracing::info!("Starting transfer from {user_id} to {}", req.target_user_id);

    let tx = state
        .ledger
        .transfer(user_id, req.target_user_id, req.amount, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

// dry run: nothing is written
async fn validate(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ValidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let validated = state
        .ledger
        .validate_operation(user_id, req.amount, req.kind, req.counterparty_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ValidationResponse {
            valid: true,
            fee: validated.fee(),
            total_debit: validated.total_debit(),
            currency: validated.currency().to_string(),
        }),
    ))
}

// return a specific transaction the user took part in
async fn get_transaction(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let tx = state.ledger.transaction_for(user_id, transaction_id).await?;
    Ok((StatusCode::OK, Json(tx)))
}

// the payee hands a received payment back
async fn refund_transaction(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let original = state.ledger.transaction_for(user_id, transaction_id).await?;
    if original.counterparty_id != Some(user_id) {
        tracing::warn!("user {user_id} tried to refund transaction {transaction_id} they did not receive");
        return Err(LedgerError::NotRefundable(transaction_id).into());
    }
    let refund = state.ledger.refund(transaction_id).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

async fn list_transactions(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let (page, limit) = Pagination { page: query.page, limit: query.limit }.resolve();
    let (transactions, total) = state
        .ledger
        .list_transactions(user_id, query.kind, page, limit)
        .await?;
    Ok((
        StatusCode::OK,
        Json(TransactionPage { transactions, total, page, limit }),
    ))
}

// every transaction of the user as server-sent events
async fn stream_transactions(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)?;
    let (transactions, _) = state
        .ledger
        .list_transactions(user_id, None, 1, u64::MAX)
        .await?;

    let stream = futures::stream::iter(transactions).map(|transaction| Event::default().json_data(transaction));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

pub fn tx_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/stats", get(get_stats))
        .route("/wallet/top-up", post(top_up))
        .route("/wallet/withdraw", post(withdraw))
        .route("/wallet/transfer", post(transfer))
        .route("/wallet/validate", post(validate))
        .route("/wallet/transactions", get(list_transactions))
        .route("/wallet/transactions/:id", get(get_transaction))
        .route("/wallet/transactions/:id/refund", post(refund_transaction))
}

pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/wallet/transactions/stream", get(stream_transactions))
}
