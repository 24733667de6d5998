//! Test utilities for tally-core
//!
//! Provides a mock completion server speaking the OpenAI-compatible wire
//! protocol, so the HTTP backend, the agent and the server can be tested
//! end to end without a real provider.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Canned answer for one `/v1/chat/completions` request
#[derive(Debug, Clone)]
pub enum MockCompletion {
    /// 200 with this text as the first choice
    Reply(String),
    /// Error status with a plain-text body
    Status(u16, String),
    /// 200 with an empty `choices` list
    NoChoices,
}

/// A request the server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct ServerState {
    script: VecDeque<MockCompletion>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<ServerState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mock OpenAI-compatible completion server
///
/// Requests beyond the script get a 503.
pub struct MockCompletionServer {
    addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockCompletionServer {
    /// Start the mock server on an available port with the given script
    pub async fn start(script: Vec<MockCompletion>) -> Self {
        let state: Shared = Arc::new(Mutex::new(ServerState {
            script: script.into(),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_completion))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Server answering with these texts, in order
    pub async fn replying(texts: &[&str]) -> Self {
        Self::start(
            texts
                .iter()
                .map(|t| MockCompletion::Reply(t.to_string()))
                .collect(),
        )
        .await
    }

    /// Get the base URL for this mock server (no `/v1` suffix)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue another canned answer
    pub fn push(&self, completion: MockCompletion) {
        lock(&self.state).script.push_back(completion);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model", "owned_by": "tally"}],
    }))
}

async fn handle_completion(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let model = body["model"].as_str().unwrap_or("mock-model").to_string();
    let next = {
        let mut state = lock(&state);
        state.requests.push(RecordedRequest {
            body,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        state.script.pop_front()
    };

    match next {
        Some(MockCompletion::Reply(text)) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop",
            }],
        }))
        .into_response(),
        Some(MockCompletion::NoChoices) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [],
        }))
        .into_response(),
        Some(MockCompletion::Status(code, text)) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            text,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "mock completion script exhausted",
        )
            .into_response(),
    }
}
