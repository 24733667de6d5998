//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tally_core::ai::{MockProvider, OpenAICompatibleBackend, Provider, Providers, APOLOGY};
use tally_core::db::Database;
use tally_core::prompts::PromptLibrary;
use tally_core::reconcile::ReconcilePolicy;
use tally_core::test_utils::MockCompletionServer;
use tower::ServiceExt;

const CREATE_LUNCH_DECISION: &str = r#"{"thought": "lunch is dining", "status": "true", "tool_names": "create_transaction", "args_list": {"create_transaction": {"data": {"amount": 30, "type": "expense", "category": "dining", "description": "lunch"}}}}"#;

fn test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_default_categories().unwrap();
    db
}

fn chat_service(db: &Database, primary: MockProvider, fallback: Option<MockProvider>) -> ChatService {
    let providers = Providers::from_chain(
        Provider::new("primary", primary),
        fallback.map(|f| Provider::new("backup", f)),
    );
    ChatService::new(db.clone(), providers, PromptLibrary::embedded().unwrap())
}

fn open_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        ..Default::default()
    }
}

fn setup_test_app() -> (Database, Router) {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::failing(), None);
    let app = create_router(db.clone(), chat, None, open_config());
    (db, app)
}

async fn get_body_json(response: axum::response::Response) -> Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a request as `user`, returning status and JSON body
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, user);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, get_body_json(response).await)
}

/// Make every insert into `table` abort
fn fail_inserts(db: &Database, table: &str) {
    db.conn()
        .unwrap()
        .execute_batch(&format!(
            r#"
            CREATE TRIGGER fail_{table}_insert BEFORE INSERT ON {table}
            BEGIN
                SELECT RAISE(ABORT, '{table} store unavailable');
            END;
            "#
        ))
        .unwrap();
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_auth_required() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::failing(), None);
    let app = create_router(db, chat, None, ServerConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/transactions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Authentication required");
}

#[tokio::test]
async fn test_auth_with_header() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::failing(), None);
    let app = create_router(db, chat, None, ServerConfig::default());

    let (status, json) = send(&app, "GET", "/api/me", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"], "alice");
    assert_eq!(json["data"]["auth_method"], "proxy_header");
}

#[tokio::test]
async fn test_auth_with_api_key() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::failing(), None);
    let config = ServerConfig {
        api_keys: parse_api_keys("first-key, second-key"),
        ..Default::default()
    };
    let app = create_router(db, chat, None, config);

    let request = |key: &str| {
        Request::builder()
            .uri("/api/me")
            .header("authorization", format!("Bearer {}", key))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request("second-key")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["user"], "api-key");
    assert_eq!(json["data"]["auth_method"], "api_key");

    let response = app.clone().oneshot(request("second-kez")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::new(), None);
    let app = create_router(db, chat, None, ServerConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], true);
    assert_eq!(json["providers"][0]["name"], "primary");
    assert_eq!(json["providers"][0]["healthy"], true);
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(parse_api_keys(" a ,, b,"), vec!["a", "b"]);
    assert!(parse_api_keys("").is_empty());
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["secret".to_string()];
    assert!(validate_api_key("secret", &keys));
    assert!(!validate_api_key("secre", &keys));
    assert!(!validate_api_key("secret", &[]));
}

#[test]
fn test_current_user_fallbacks() {
    let mut headers = HeaderMap::new();
    assert_eq!(current_user(&headers), DEFAULT_USER);

    headers.insert("authorization", HeaderValue::from_static("Bearer k"));
    assert_eq!(current_user(&headers), "api-key");

    headers.insert(USER_HEADER, HeaderValue::from_static("bob"));
    assert_eq!(current_user(&headers), "bob");
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_create_transaction_updates_plan() {
    let (_db, app) = setup_test_app();

    let (status, plan) = send(
        &app,
        "POST",
        "/api/plans",
        "alice",
        Some(json!({"name": "Eating out", "target_amount": 800, "category": "dining"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["data"]["current_amount"], 0.0);
    assert_eq!(plan["data"]["period"], "month");

    let (status, json) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 30, "type": "expense", "category": "dining", "description": "lunch"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["amount"], -30.0);
    assert_eq!(json["data"]["type"], "expense");
    assert!(json.get("warnings").is_none());

    let (_, plans) = send(&app, "GET", "/api/plans", "alice", None).await;
    assert_eq!(plans["data"][0]["current_amount"], 30.0);
}

#[tokio::test]
async fn test_create_transaction_validation() {
    let (_db, app) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 0, "type": "expense", "category": "dining"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());

    // Unknown type is a body rejection, still reported as an envelope
    let (status, json) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 5, "type": "transfer", "category": "dining"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_update_and_delete_transaction() {
    let (_db, app) = setup_test_app();

    let (_, created) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 40, "type": "expense", "category": "dining"})),
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/transactions/{}", id),
        "alice",
        Some(json!({"amount": 25})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["amount"], -25.0);

    // Another user cannot touch it
    let (status, json) = send(
        &app,
        "DELETE",
        &format!("/api/transactions/{}", id),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);

    let (status, deleted) = send(
        &app,
        "DELETE",
        &format!("/api/transactions/{}", id),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["id"], id);

    let (_, list) = send(&app, "GET", "/api/transactions", "alice", None).await;
    assert_eq!(list["data"]["total"], 0);
}

#[tokio::test]
async fn test_transactions_are_per_user() {
    let (_db, app) = setup_test_app();

    send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 12, "type": "expense", "category": "transport"})),
    )
    .await;

    let (_, alice) = send(&app, "GET", "/api/transactions", "alice", None).await;
    let (_, bob) = send(&app, "GET", "/api/transactions", "bob", None).await;
    assert_eq!(alice["data"]["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(bob["data"]["transactions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (_db, app) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_best_effort_sync_failure_is_a_warning() {
    let db = test_db().with_reconcile_policy(ReconcilePolicy::BestEffort);
    let chat = chat_service(&db, MockProvider::failing(), None);
    let app = create_router(db.clone(), chat, None, open_config());

    send(
        &app,
        "POST",
        "/api/plans",
        "alice",
        Some(json!({"name": "Food", "target_amount": 500, "category": "dining"})),
    )
    .await;
    db.conn()
        .unwrap()
        .execute_batch(
            r#"
            CREATE TRIGGER fail_budget_update BEFORE UPDATE ON budgets
            BEGIN
                SELECT RAISE(ABORT, 'budget store unavailable');
            END;
            "#,
        )
        .unwrap();

    let (status, json) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 30, "type": "expense", "category": "dining"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
}

// ========== Plan API Tests ==========

#[tokio::test]
async fn test_plan_backfill_and_recompute() {
    let (db, app) = setup_test_app();

    for amount in [30, 20, 50] {
        send(
            &app,
            "POST",
            "/api/transactions",
            "alice",
            Some(json!({"amount": amount, "type": "expense", "category": "dining"})),
        )
        .await;
    }

    let (status, plan) = send(
        &app,
        "POST",
        "/api/plans",
        "alice",
        Some(json!({"name": "Dining", "target_amount": 300, "category": "dining", "type": "year"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["data"]["current_amount"], 100.0);
    assert_eq!(plan["data"]["period"], "year");
    let id = plan["data"]["id"].as_i64().unwrap();

    // Drift the cached total, then repair it
    db.conn()
        .unwrap()
        .execute("UPDATE budgets SET current_amount = 7 WHERE id = ?", [id])
        .unwrap();
    let (status, repaired) = send(
        &app,
        "POST",
        &format!("/api/plans/{}/recompute", id),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repaired["data"]["current_amount"], 100.0);

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/plans/{}", id),
        "alice",
        Some(json!({"target_amount": 450})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["target_amount"], 450.0);
    assert_eq!(updated["data"]["name"], "Dining");

    let (status, _) = send(&app, "DELETE", &format!("/api/plans/{}", id), "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/api/plans/{}", id), "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plan_invalid_type() {
    let (_db, app) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/plans",
        "alice",
        Some(json!({"name": "Weekly", "target_amount": 100, "category": "dining", "type": "week"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid range type: week");
}

// ========== Category API Tests ==========

#[tokio::test]
async fn test_category_lifecycle() {
    let (_db, app) = setup_test_app();

    let (_, list) = send(&app, "GET", "/api/categories", "alice", None).await;
    let seeded = list["data"].as_array().unwrap().len();
    assert!(seeded > 0);

    let (status, created) = send(
        &app,
        "POST",
        "/api/categories",
        "alice",
        Some(json!({"name": "pets"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, json) = send(
        &app,
        "POST",
        "/api/categories",
        "alice",
        Some(json!({"name": "PETS"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (status, renamed) = send(
        &app,
        "PUT",
        &format!("/api/categories/{}", id),
        "alice",
        Some(json!({"name": "pet care"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["data"]["name"], "pet care");

    let (status, deleted) = send(
        &app,
        "DELETE",
        &format!("/api/categories/{}", id),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["name"], "pet care");

    let (_, list) = send(&app, "GET", "/api/categories", "alice", None).await;
    assert_eq!(list["data"].as_array().unwrap().len(), seeded);
}

// ========== Report API Tests ==========

#[tokio::test]
async fn test_summary_and_reports() {
    let (_db, app) = setup_test_app();

    for body in [
        json!({"amount": 580, "type": "expense", "category": "dining"}),
        json!({"amount": 320, "type": "expense", "category": "transport"}),
        json!({"amount": 3000, "type": "income", "category": "salary"}),
    ] {
        send(&app, "POST", "/api/transactions", "alice", Some(body)).await;
    }

    let (status, summary) = send(&app, "GET", "/api/summary", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["data"]["income"], 3000.0);
    assert_eq!(summary["data"]["expense"], -900.0);
    assert_eq!(summary["data"]["balance"], 2100.0);

    let (status, report) = send(&app, "GET", "/api/reports?range=year", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["data"]["range"], "year");
    assert_eq!(report["data"]["total"], 900.0);
    assert_eq!(report["data"]["categories"][0]["name"], "dining");

    let (status, _) = send(&app, "GET", "/api/reports?range=week", "alice", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ========== Chat API Tests ==========

#[tokio::test]
async fn test_chat_records_expense() {
    let db = test_db();
    let primary = MockProvider::new()
        .reply(CREATE_LUNCH_DECISION)
        .reply("Done, I recorded this expense: amount 30.00, category dining, date today.");
    let chat = chat_service(&db, primary, Some(MockProvider::new()));
    let app = create_router(db.clone(), chat, None, open_config());

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        json["data"]["reply"],
        "Done, I recorded this expense: amount 30.00, category dining, date today."
    );
    assert_eq!(json["data"]["degraded"], false);
    assert_eq!(json["data"]["agent"]["tool"], "create_transaction");
    assert_eq!(db.count_transactions("alice").unwrap(), 1);

    let (_, history) = send(&app, "GET", "/api/chat/history?limit=2", "alice", None).await;
    let records = history["data"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["direction"], "agent");
    assert_eq!(records[1]["content"], "lunch 30 yuan");

    let (_, audit) = send(&app, "GET", "/api/audit", "alice", None).await;
    assert_eq!(audit["data"][0]["action"], "chat_tool");
}

#[tokio::test]
async fn test_chat_degrades_when_providers_fail() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::failing(), Some(MockProvider::failing()));
    let app = create_router(db.clone(), chat, None, open_config());

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["reply"], APOLOGY);
    assert_eq!(json["data"]["degraded"], true);
    assert_eq!(db.count_transactions("alice").unwrap(), 0);
}

#[tokio::test]
async fn test_chat_unknown_provider_and_empty_message() {
    let (_db, app) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "hi", "provider": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Config error: Unknown provider: nope");

    let (status, _) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_through_openai_compatible_server() {
    let server = MockCompletionServer::replying(&[
        CREATE_LUNCH_DECISION,
        "Recorded 30.00 for dining.",
    ])
    .await;
    let backend = OpenAICompatibleBackend::new(&server.url(), "qwen-plus").unwrap();

    let db = test_db();
    let providers = Providers::from_chain(Provider::new("qwen", backend), None);
    let chat = ChatService::new(db.clone(), providers, PromptLibrary::embedded().unwrap());
    let app = create_router(db.clone(), chat, None, open_config());

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["reply"], "Recorded 30.00 for dining.");
    assert_eq!(json["data"]["provider"], "qwen");
    assert_eq!(db.count_transactions("alice").unwrap(), 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body["model"], "qwen-plus");
    assert_eq!(requests[0].body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn test_quick_entry() {
    let (db, app) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat/quick",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["intent"], "RECORD_TRANSACTION");
    assert_eq!(json["data"]["category"], "dining");
    assert_eq!(
        json["data"]["reply"],
        "Recorded expense: amount 30.00, category dining, date today."
    );
    assert_eq!(db.count_transactions("alice").unwrap(), 1);

    let (_, json) = send(
        &app,
        "POST",
        "/api/chat/quick",
        "alice",
        Some(json!({"message": "how much have I spent?"})),
    )
    .await;
    assert_eq!(json["data"]["intent"], "QUERY_DATA");
    assert_eq!(db.chat_history("alice", 10).unwrap().len(), 4);
}

#[tokio::test]
async fn test_quick_entry_reports_unsaved_chat() {
    let (db, app) = setup_test_app();
    fail_inserts(&db, "chats");

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat/quick",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        json["data"]["reply"],
        "Recorded expense: amount 30.00, category dining, date today."
    );
    let warnings = json["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0]
        .as_str()
        .unwrap()
        .starts_with("failed to save user message: "));
    assert!(warnings[1]
        .as_str()
        .unwrap()
        .starts_with("failed to save assistant reply: "));
    assert_eq!(db.count_transactions("alice").unwrap(), 1);
}

// ========== Registry and Provider Tests ==========

#[tokio::test]
async fn test_list_tools() {
    let (_db, app) = setup_test_app();

    let (status, json) = send(&app, "GET", "/api/tools", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let tools = json["data"].as_array().unwrap();
    assert_eq!(tools.len(), 14);
    assert!(tools.iter().any(|t| t["name"] == "create_transaction"));
}

#[tokio::test]
async fn test_list_providers() {
    let db = test_db();
    let chat = chat_service(&db, MockProvider::new(), Some(MockProvider::new()));
    let app = create_router(db, chat, None, open_config());

    let (status, json) = send(&app, "GET", "/api/providers", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["primary"], "primary");
    assert_eq!(json["data"]["fallback"], "backup");
    assert_eq!(json["data"]["providers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_mutations_are_audited() {
    let (_db, app) = setup_test_app();

    send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 9.5, "type": "expense", "category": "dining"})),
    )
    .await;

    let (_, alice) = send(&app, "GET", "/api/audit", "alice", None).await;
    let entries = alice["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "create");
    assert_eq!(entries[0]["entity_type"], "transaction");

    let (_, bob) = send(&app, "GET", "/api/audit", "bob", None).await;
    assert!(bob["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_audit_failure_is_a_warning() {
    let db = test_db();
    let primary = MockProvider::new()
        .reply(CREATE_LUNCH_DECISION)
        .reply("Recorded 30.00 for dining.");
    let chat = chat_service(&db, primary, None);
    let app = create_router(db.clone(), chat, None, open_config());
    fail_inserts(&db, "audit_log");

    let audit_warning = |json: &Value| {
        let warnings = json["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0]
            .as_str()
            .unwrap()
            .starts_with("failed to write audit entry: "));
    };

    // The write stands, so a retry would double-count it
    let (status, json) = send(
        &app,
        "POST",
        "/api/transactions",
        "alice",
        Some(json!({"amount": 30, "type": "expense", "category": "dining"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    audit_warning(&json);
    assert_eq!(db.count_transactions("alice").unwrap(), 1);

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat/quick",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    audit_warning(&json);
    assert_eq!(db.count_transactions("alice").unwrap(), 2);

    let (status, json) = send(
        &app,
        "POST",
        "/api/chat",
        "alice",
        Some(json!({"message": "lunch 30 yuan"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["reply"], "Recorded 30.00 for dining.");
    audit_warning(&json);
    assert_eq!(db.count_transactions("alice").unwrap(), 3);

    let (status, json) = send(
        &app,
        "POST",
        "/api/categories",
        "alice",
        Some(json!({"name": "pets"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    audit_warning(&json);
    assert!(db.resolve_category("pets").unwrap().is_some());
}
