//! Tally Web Server
//!
//! Axum-based REST API for the Tally conversational expense tracker.
//!
//! Security features:
//! - Reverse-proxy user header or API key authentication (secure by default,
//!   use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits, envelope errors)
//! - Audit logging for every ledger mutation
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::ai::CompletionBackend;
use tally_core::db::Database;
use tally_core::models::Envelope;
use tally_core::reconcile::LedgerWrite;
use tally_core::{ChatService, HeuristicAssistant};

mod handlers;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header set by the trusted reverse proxy with the authenticated username
pub const USER_HEADER: &str = "x-tally-user";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Acting user when no user header is present
pub const DEFAULT_USER: &str = "local";

/// Acting user for API key callers that do not name a user
const API_KEY_USER: &str = "api-key";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys for service authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Parse a comma-separated list of API keys, dropping empty entries
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub chat: ChatService,
    pub quick: HeuristicAssistant,
}

/// Authentication middleware - accepts the reverse-proxy user header or an API key
///
/// # Security Notes
///
/// **User header**: `x-tally-user` is trusted as set by the reverse proxy in
/// front of the server. It can be spoofed if the server is exposed directly.
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    // Check for API key in Authorization header (Bearer token)
    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = %current_user(request.headers()), path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    if let Some(user) = header_user(request.headers()) {
        info!(user = %user, path = %request.uri().path(), "Authenticated via proxy header");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(Envelope::<()>::failure("Authentication required")),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

fn header_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn has_bearer(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
}

/// Acting username for a request
///
/// The proxy header wins; API key callers without it act as "api-key";
/// everything else (auth disabled) acts as the local user.
pub fn current_user(headers: &HeaderMap) -> String {
    if let Some(user) = header_user(headers) {
        return user;
    }
    if has_bearer(headers) {
        return API_KEY_USER.to_string();
    }
    DEFAULT_USER.to_string()
}

/// Wrap data in a success envelope
pub(crate) fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::ok(data))
}

/// Wrap a mutation result, carrying an audit warning if there was one
pub(crate) fn ok_audited<T: Serialize>(
    data: T,
    audit_warning: Option<String>,
) -> Json<Envelope<T>> {
    Json(Envelope::ok(data).with_warnings(audit_warning))
}

/// Wrap a ledger write, carrying budget sync and audit warnings
pub(crate) fn ok_write<T: Serialize>(
    write: LedgerWrite<T>,
    audit_warning: Option<String>,
) -> Json<Envelope<T>> {
    let warnings = write.warnings();
    Json(
        Envelope::ok(write.value)
            .with_warnings(warnings)
            .with_warnings(audit_warning),
    )
}

/// Record a committed mutation in the audit log
///
/// The mutation already stands, so a failed audit insert is returned as a
/// warning for the envelope instead of failing the request.
pub(crate) fn audit(
    db: &Database,
    username: &str,
    action: &str,
    entity_type: &str,
    entity_id: Option<i64>,
    details: Option<&str>,
) -> Option<String> {
    match db.log_audit(username, action, Some(entity_type), entity_id, details) {
        Ok(_) => None,
        Err(e) => {
            warn!(
                username = %username,
                action = %action,
                entity_type = %entity_type,
                error = %e,
                "Failed to write audit entry"
            );
            Some(format!("failed to write audit entry: {}", e))
        }
    }
}

/// Create the application router
pub fn create_router(
    db: Database,
    chat: ChatService,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> Router {
    let state = Arc::new(AppState {
        quick: HeuristicAssistant::new(db.clone()),
        db,
        config: config.clone(),
        chat,
    });

    let api_routes = Router::new()
        // Auth
        .route("/me", get(handlers::get_me))
        // Chat
        .route("/chat", post(handlers::post_chat))
        .route("/chat/history", get(handlers::chat_history))
        .route("/chat/quick", post(handlers::quick_entry))
        // Ledger
        .route("/summary", get(handlers::get_summary))
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/transactions/:id",
            put(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        // Budgets
        .route("/plans", get(handlers::list_plans).post(handlers::create_plan))
        .route(
            "/plans/:id",
            put(handlers::update_plan).delete(handlers::delete_plan),
        )
        .route("/plans/:id/recompute", post(handlers::recompute_plan))
        // Categories
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::add_category),
        )
        .route(
            "/categories/:id",
            put(handlers::update_category).delete(handlers::delete_category),
        )
        // Reports
        .route("/reports", get(handlers::get_reports))
        // Registry and providers
        .route("/tools", get(handlers::list_tools))
        .route("/providers", get(handlers::list_providers))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(USER_HEADER),
        ]);
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        cors
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    };

    // Security headers
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        // Health stays reachable without credentials
        .route("/api/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve static files if directory provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    chat: ChatService,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        info!("No API keys configured; only requests carrying {} are accepted", USER_HEADER);
    }

    check_providers(&chat).await;

    let app = create_router(db, chat, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log provider connection status
async fn check_providers(chat: &ChatService) {
    let providers = chat.providers();
    let names = [Some(providers.primary_name()), providers.fallback_name()];
    for name in names.into_iter().flatten() {
        let Some(provider) = providers.get(name) else {
            continue;
        };
        if provider.client.health_check().await {
            info!(
                provider = %name,
                host = %provider.client.host(),
                model = %provider.client.model(),
                "Completion provider reachable"
            );
        } else {
            warn!(
                provider = %name,
                host = %provider.client.host(),
                "Completion provider configured but not responding"
            );
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error to its HTTP status
    ///
    /// Validation, unknown providers, missing rows and duplicates are the
    /// caller's fault and keep their message; everything else is hidden.
    pub fn from_core(err: tally_core::Error) -> Self {
        use tally_core::Error;
        match err {
            Error::InvalidData(_) | Error::Dispatch(_) | Error::Config(_) => {
                Self::bad_request(&err.to_string())
            }
            Error::NotFound(_) => Self::not_found(&err.to_string()),
            Error::Conflict(_) => Self::conflict(&err.to_string()),
            other => Self::from(other),
        }
    }

    /// Map a malformed JSON body to a 400
    pub fn rejection(rejection: JsonRejection) -> Self {
        Self::bad_request(&rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        (self.status, Json(Envelope::<()>::failure(self.message))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
