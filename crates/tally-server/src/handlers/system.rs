//! Function registry, provider status and health handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{ok, AppState};
use tally_core::ai::{ProviderInfo, ProviderStatus};
use tally_core::models::Envelope;
use tally_core::tools::{self, ToolSpec};

/// GET /api/tools - Registered tool names, descriptions and parameter schemas
pub async fn list_tools() -> Json<Envelope<&'static [ToolSpec]>> {
    ok(tools::registry())
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub primary: String,
    pub fallback: Option<String>,
    pub providers: Vec<ProviderInfo>,
}

/// GET /api/providers - Configured completion providers and the default chain
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Envelope<ProvidersResponse>> {
    let providers = state.chat.providers();
    ok(ProvidersResponse {
        primary: providers.primary_name().to_string(),
        fallback: providers.fallback_name().map(str::to_string),
        providers: providers.list(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub providers: Vec<ProviderStatus>,
}

/// GET /api/health - Liveness plus database and provider reachability
///
/// Always 200; a down provider only degrades chat replies.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.db.conn().is_ok();
    let providers = state.chat.providers().check_all().await;
    let status = if database { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database,
        providers,
    })
}
