//! Category handlers
//!
//! Categories are shared by all users.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{audit, current_user, ok, ok_audited, AppError, AppState};
use tally_core::models::{Category, Envelope};

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<Vec<Category>>>, AppError> {
    Ok(ok(state.db.list_categories()?))
}

/// POST /api/categories - Add a category; duplicate names are a 409
pub async fn add_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CategoryRequest>, JsonRejection>,
) -> Result<Json<Envelope<Category>>, AppError> {
    let Json(body) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);

    let category = state
        .db
        .add_category(&body.name)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "create",
        "category",
        Some(category.id),
        Some(&format!("name={}", category.name)),
    );

    Ok(ok_audited(category, warning))
}

/// PUT /api/categories/:id - Rename a category
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<CategoryRequest>, JsonRejection>,
) -> Result<Json<Envelope<Category>>, AppError> {
    let Json(body) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);

    let category = state
        .db
        .update_category(id, &body.name)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "update",
        "category",
        Some(id),
        Some(&format!("name={}", category.name)),
    );

    Ok(ok_audited(category, warning))
}

/// DELETE /api/categories/:id - Returns the removed category
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Envelope<Category>>, AppError> {
    let username = current_user(request.headers());

    let category = state
        .db
        .delete_category(id)
        .map_err(AppError::from_core)?;

    let warning = audit(
        &state.db,
        &username,
        "delete",
        "category",
        Some(id),
        Some(&format!("name={}", category.name)),
    );

    Ok(ok_audited(category, warning))
}
