//! Authentication-related handlers

use axum::extract::Request;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use tally_core::models::Envelope;

use crate::{current_user, ok, AppState, USER_HEADER};

/// Response for the /api/me endpoint
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// The acting username
    pub user: String,
    /// How the user was authenticated
    pub auth_method: String,
}

/// Get the currently authenticated user
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Json<Envelope<MeResponse>> {
    let headers = request.headers();
    let user = current_user(headers);

    let auth_method = if headers.contains_key(USER_HEADER) {
        "proxy_header"
    } else if headers.contains_key("authorization") && state.config.require_auth {
        "api_key"
    } else {
        "none"
    };

    ok(MeResponse {
        user,
        auth_method: auth_method.to_string(),
    })
}
