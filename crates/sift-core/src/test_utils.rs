//! Test utilities for sift-core
//!
//! This module provides testing infrastructure including a mock model server
//! that speaks both the Ollama generate API and the OpenAI chat completions
//! API, for backend and end-to-end tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::guess_categories;

/// A prompt received by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockState {
    /// Fixed reply; when unset a keyword-based rankings reply is generated
    response: Option<String>,
    fail_status: Option<u16>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<MockState>>;

/// Mock model server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
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

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Reply to every generation request with `text`
    pub fn respond_with(&self, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.response = Some(text.to_string());
        state.fail_status = None;
    }

    /// Reply to every generation request with the given HTTP status
    pub fn fail_with_status(&self, status: u16) {
        self.state.lock().unwrap().fail_status = Some(status);
    }

    /// Number of generation requests received
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Generation requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Record a request and decide the reply
fn reply(state: &SharedState, request: RecordedRequest) -> Result<String, StatusCode> {
    let mut state = state.lock().unwrap();
    let text = request.prompt.clone();
    state.requests.push(request);

    if let Some(status) = state.fail_status {
        return Err(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
    }
    Ok(state
        .response
        .clone()
        .unwrap_or_else(|| rankings_mock(&text)))
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<SharedState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let recorded = RecordedRequest {
        model: request.model.clone(),
        prompt: request.prompt,
        system: request.system,
        authorization: None,
    };

    match reply(&state, recorded) {
        Ok(response) => Json(GenerateResponse {
            model: request.model,
            response,
            done: true,
        })
        .into_response(),
        Err(status) => (status, "mock failure").into_response(),
    }
}

/// OpenAI models endpoint (health check)
async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}]
    }))
}

/// OpenAI chat completions endpoint
async fn handle_chat(
    State(state): State<SharedState>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let system = request
        .messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.clone());
    let prompt = request
        .messages
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let recorded = RecordedRequest {
        model: request.model.clone(),
        prompt,
        system,
        authorization,
    };

    match reply(&state, recorded) {
        Ok(content) => Json(serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Err(status) => (status, "mock failure").into_response(),
    }
}

/// Keyword-based rankings reply
///
/// Wraps the JSON in a fence with commentary, like real models tend to.
fn rankings_mock(prompt: &str) -> String {
    let (top, second) = guess_categories(prompt);

    format!(
        "Here is my ranking:\n```json\n{{\"rankings\":[{{\"category\":\"{}\",\"score\":0.9}},{{\"category\":\"{}\",\"score\":0.4}}]}}\n```",
        top, second
    )
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(default)]
    system: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}
