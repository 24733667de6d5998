//! Budget plan handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{audit, current_user, ok, ok_audited, AppError, AppState};
use tally_core::models::{Budget, BudgetUpdate, Envelope, NewBudget, Period};

/// Body for creating a plan
///
/// The window type is parsed here so that an unknown type is a 400 with a
/// readable message rather than a body rejection.
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub target_amount: f64,
    pub category: String,
    #[serde(default, rename = "type")]
    pub period: Option<String>,
}

impl CreatePlanRequest {
    fn into_new_budget(self) -> Result<NewBudget, AppError> {
        let period = self
            .period
            .as_deref()
            .map(str::parse::<Period>)
            .transpose()
            .map_err(|e| AppError::bad_request(&e))?;
        Ok(NewBudget {
            name: self.name,
            target_amount: self.target_amount,
            category: self.category,
            period,
        })
    }
}

/// GET /api/plans - The acting user's budgets
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Envelope<Vec<Budget>>>, AppError> {
    let username = current_user(request.headers());
    Ok(ok(state.db.list_budgets(&username)?))
}

/// POST /api/plans - Create a budget, backfilled from existing expenses
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> Result<Json<Envelope<Budget>>, AppError> {
    let Json(body) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);
    let new = body.into_new_budget()?;

    let budget = state
        .db
        .create_budget(&username, &new)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "create",
        "budget",
        Some(budget.id),
        Some(&format!(
            "category={}, target={}, period={}, current={}",
            budget.category, budget.target_amount, budget.period, budget.current_amount
        )),
    );

    Ok(ok_audited(budget, warning))
}

/// PUT /api/plans/:id - Rename or retarget a budget
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<BudgetUpdate>, JsonRejection>,
) -> Result<Json<Envelope<Budget>>, AppError> {
    let Json(update) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);

    let budget = state
        .db
        .update_budget(&username, id, &update)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "update",
        "budget",
        Some(id),
        Some(&format!("name={}, target={}", budget.name, budget.target_amount)),
    );

    Ok(ok_audited(budget, warning))
}

/// DELETE /api/plans/:id
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Envelope<i64>>, AppError> {
    let username = current_user(request.headers());

    state
        .db
        .delete_budget(&username, id)
        .map_err(AppError::from_core)?;

    let warning = audit(&state.db, &username, "delete", "budget", Some(id), None);

    Ok(ok_audited(id, warning))
}

/// POST /api/plans/:id/recompute - Rebuild the cached total from the ledger
pub async fn recompute_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Envelope<Budget>>, AppError> {
    let username = current_user(request.headers());

    let budget = state
        .db
        .recompute_budget(&username, id)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "recompute",
        "budget",
        Some(id),
        Some(&format!("current={}", budget.current_amount)),
    );

    Ok(ok_audited(budget, warning))
}
