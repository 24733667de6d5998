//! Report handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{current_user, ok, AppError, AppState};
use tally_core::models::{Envelope, MonthlySummary, Period, SpendingReport};

/// GET /api/summary - Income, expense and balance for the current month
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Envelope<MonthlySummary>>, AppError> {
    let username = current_user(request.headers());
    Ok(ok(state.db.monthly_summary(&username)?))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// month, quarter or year (default month)
    pub range: Option<String>,
}

/// GET /api/reports?range= - Spending by category over the current period
pub async fn get_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportQuery>,
    request: Request,
) -> Result<Json<Envelope<SpendingReport>>, AppError> {
    let username = current_user(request.headers());

    let range = params
        .range
        .as_deref()
        .map(str::parse::<Period>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?
        .unwrap_or_default();

    Ok(ok(state.db.spending_report(&username, range)?))
}
