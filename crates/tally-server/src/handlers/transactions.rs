//! Transaction handlers
//!
//! Every write goes through the ledger, so matching budgets are reconciled
//! in the same call. Budget sync problems come back as envelope warnings.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{audit, current_user, ok, ok_write, AppError, AppState, MAX_PAGE_LIMIT};
use tally_core::db::DEFAULT_TRANSACTION_LIMIT;
use tally_core::models::{Envelope, NewTransaction, Transaction, TransactionUpdate};

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_TRANSACTION_LIMIT
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transactions: Vec<Transaction>,
    pub total: i64,
    pub limit: i64,
}

/// GET /api/transactions - Most recent transactions, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionQuery>,
    request: Request,
) -> Result<Json<Envelope<TransactionResponse>>, AppError> {
    let username = current_user(request.headers());

    // Input validation: clamp pagination parameters
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let transactions = state.db.list_transactions(&username, limit)?;
    let total = state.db.count_transactions(&username)?;

    Ok(ok(TransactionResponse {
        transactions,
        total,
        limit,
    }))
}

/// POST /api/transactions - Record a transaction
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewTransaction>, JsonRejection>,
) -> Result<Json<Envelope<Transaction>>, AppError> {
    let Json(new) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);

    let write = state
        .db
        .create_transaction(&username, &new)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "create",
        "transaction",
        Some(write.value.id),
        Some(&format!(
            "amount={}, type={}, category={}",
            write.value.amount, write.value.kind, write.value.category
        )),
    );

    Ok(ok_write(write, warning))
}

/// PUT /api/transactions/:id - Update fields of a transaction
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<TransactionUpdate>, JsonRejection>,
) -> Result<Json<Envelope<Transaction>>, AppError> {
    let Json(update) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);

    let write = state
        .db
        .update_transaction(&username, id, &update)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "update",
        "transaction",
        Some(id),
        Some(&format!(
            "amount={}, type={}, category={}",
            write.value.amount, write.value.kind, write.value.category
        )),
    );

    Ok(ok_write(write, warning))
}

/// DELETE /api/transactions/:id - Delete a transaction, returning the removed row
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Envelope<Transaction>>, AppError> {
    let username = current_user(request.headers());

    let write = state
        .db
        .delete_transaction(&username, id)
        .map_err(AppError::from_core)?;

    let warning = audit(&state.db, &username, "delete", "transaction", Some(id), None);

    Ok(ok_write(write, warning))
}
