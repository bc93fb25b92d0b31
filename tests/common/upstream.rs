//! Scripted mock of the GLM upstream.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One scripted upstream reply, consumed in order.
pub enum MockResponse {
    /// A complete SSE stream of `data:` payloads ending in `[DONE]`.
    Sse {
        payloads: Vec<String>,
        delay: Option<Duration>,
    },
    /// A plain status + body (for retry scenarios).
    Status { status: u16, body: String },
}

impl MockResponse {
    pub fn sse(payloads: Vec<String>) -> Self {
        Self::Sse {
            payloads,
            delay: None,
        }
    }

    pub fn slow_sse(payloads: Vec<String>, delay: Duration) -> Self {
        Self::Sse {
            payloads,
            delay: Some(delay),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.to_string(),
        }
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    responses: Mutex<VecDeque<MockResponse>>,
    pub chat_calls: AtomicUsize,
    pub token_fetches: AtomicUsize,
}

impl MockUpstream {
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }
}

pub async fn spawn(responses: Vec<MockResponse>) -> Arc<MockUpstream> {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let mock = Arc::new(MockUpstream {
        addr,
        responses: Mutex::new(responses.into_iter().collect()),
        chat_calls: AtomicUsize::new(0),
        token_fetches: AtomicUsize::new(0),
    });

    let app = axum::Router::new()
        .route("/api/chat/completions", post(chat_handler))
        .route("/api/v1/auths/", get(token_handler))
        .with_state(mock.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock upstream");
    });

    mock
}

async fn chat_handler(State(mock): State<Arc<MockUpstream>>, _body: String) -> Response {
    mock.chat_calls.fetch_add(1, Ordering::SeqCst);

    let next = mock.responses.lock().expect("lock").pop_front();
    match next {
        Some(MockResponse::Sse { payloads, delay }) => {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut body = String::new();
            for payload in payloads {
                body.push_str("data: ");
                body.push_str(&payload);
                body.push_str("\n\n");
            }
            body.push_str("data: [DONE]\n\n");
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                body,
            )
                .into_response()
        }
        Some(MockResponse::Status { status, body }) => (
            StatusCode::from_u16(status).expect("scripted status"),
            body,
        )
            .into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "mock script exhausted").into_response(),
    }
}

async fn token_handler(State(mock): State<Arc<MockUpstream>>) -> Json<serde_json::Value> {
    let n = mock.token_fetches.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({ "token": format!("anon-e2e-{n}") }))
}

// Payload builders for the scripted streams.

pub fn answer_delta(text: &str) -> String {
    serde_json::json!({
        "type": "chat",
        "data": { "phase": "answer", "delta_content": text }
    })
    .to_string()
}

pub fn thinking_delta(text: &str) -> String {
    serde_json::json!({
        "type": "chat",
        "data": { "phase": "thinking", "delta_content": text }
    })
    .to_string()
}

pub fn tool_call_edit(edit_index: usize, edit_content: &str) -> String {
    serde_json::json!({
        "type": "chat",
        "data": {
            "phase": "tool_call",
            "edit_index": edit_index,
            "edit_content": edit_content
        }
    })
    .to_string()
}

pub fn done(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> String {
    serde_json::json!({
        "type": "chat",
        "data": {
            "phase": "done",
            "done": true,
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
                "total_tokens": total_tokens
            }
        }
    })
    .to_string()
}

pub fn glm_block(id: &str, name: &str, arguments: &str) -> String {
    let escaped = arguments.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"<glm_block>{{"type":"tool_call","data":{{"metadata":{{"id":"{id}","name":"{name}","arguments":"{escaped}"}},"status":"pending"}}}}</glm_block>"#
    )
}
