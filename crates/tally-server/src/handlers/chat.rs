//! Chat handlers: the agent path, the heuristic quick-entry path and history

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{audit, current_user, ok, AppError, AppState, MAX_PAGE_LIMIT};
use tally_core::db::DEFAULT_HISTORY_LIMIT;
use tally_core::models::{ChatDirection, ChatRecord, Envelope};
use tally_core::{ChatExchange, QuickReply};

/// Body of a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Provider to try first instead of the configured primary
    #[serde(default)]
    pub provider: Option<String>,
}

fn require_message(message: &str) -> Result<&str, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("message is required"));
    }
    Ok(message)
}

/// POST /api/chat - Answer a message through the agent and the synthesizer
///
/// Provider trouble degrades the reply rather than failing the request.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Envelope<ChatExchange>>, AppError> {
    let Json(body) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);
    let message = require_message(&body.message)?;

    let mut exchange = state
        .chat
        .handle(&username, message, body.provider.as_deref())
        .await
        .map_err(AppError::from_core)?;

    if exchange.agent["selected"] == true {
        let tool = exchange.agent["tool"].as_str().unwrap_or_default();
        let details = format!("tool={}, provider={:?}", tool, exchange.provider);
        exchange.warnings.extend(audit(
            &state.db,
            &username,
            "chat_tool",
            "tool",
            None,
            Some(&details),
        ));
    }
    info!(
        username = %username,
        degraded = exchange.degraded,
        provider = ?exchange.provider,
        "Chat message answered"
    );

    let warnings = std::mem::take(&mut exchange.warnings);
    Ok(Json(Envelope::ok(exchange).with_warnings(warnings)))
}

/// Body of a quick-entry message
#[derive(Debug, Deserialize)]
pub struct QuickRequest {
    pub message: String,
}

/// POST /api/chat/quick - Model-free intent parsing
///
/// Records "lunch 30 yuan" style messages as expenses, answers everything
/// else with a month-to-date summary.
pub async fn quick_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<QuickRequest>, JsonRejection>,
) -> Result<Json<Envelope<QuickReply>>, AppError> {
    let Json(body) = payload.map_err(AppError::rejection)?;
    let username = current_user(&headers);
    let message = require_message(&body.message)?;

    let mut warnings = Vec::new();
    if let Err(e) = state.db.add_chat(&username, message, ChatDirection::User) {
        warn!(username = %username, error = %e, "Failed to save user message");
        warnings.push(format!("failed to save user message: {}", e));
    }

    let mut reply = state
        .quick
        .handle(&username, message)
        .map_err(AppError::from_core)?;
    warnings.append(&mut reply.warnings);

    if let Err(e) = state
        .db
        .add_chat(&username, &reply.reply, ChatDirection::Agent)
    {
        warn!(username = %username, error = %e, "Failed to save assistant reply");
        warnings.push(format!("failed to save assistant reply: {}", e));
    }

    let details = serde_json::to_string(&reply.intent).ok();
    warnings.extend(audit(
        &state.db,
        &username,
        "quick_entry",
        "chat",
        None,
        details.as_deref(),
    ));

    Ok(Json(Envelope::ok(reply).with_warnings(warnings)))
}

/// Query parameters for chat history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    DEFAULT_HISTORY_LIMIT
}

/// GET /api/chat/history - Most recent chat records, newest first
pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Envelope<Vec<ChatRecord>>>, AppError> {
    let username = current_user(&headers);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    Ok(ok(state.db.chat_history(&username, limit)?))
}
