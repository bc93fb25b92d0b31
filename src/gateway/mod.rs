//! HTTP gateway layer (Axum): routing, middleware and the operator
//! surface.

pub mod error;
pub mod handler;
pub mod state;


use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use error::ApiError;
pub use handler::chat_completions_handler;
pub use state::AppState;

use crate::model::MODEL_CARDS;

/// Per-request metadata the middleware layer attaches before routing: the
/// correlation id echoed in `X-Request-ID` and the socket peer, when the
/// server was started with connect info.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub request_id: String,
    pub peer: Option<SocketAddr>,
}

pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

    Router::new()
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/models", get(models_handler))
        .route("/health", get(health_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/dashboard/stats", get(dashboard_stats_handler))
        .route("/dashboard/requests", get(dashboard_requests_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    request.extensions_mut().insert(ClientMeta {
        request_id: id.clone(),
        peer,
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn models_handler() -> Json<serde_json::Value> {
    let data: Vec<serde_json::Value> = MODEL_CARDS
        .iter()
        .map(|card| {
            serde_json::json!({
                "id": card.id,
                "object": "model",
                "created": card.created,
                "owned_by": "z.ai",
            })
        })
        .collect();

    Json(serde_json::json!({ "object": "list", "data": data }))
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
        "config": {
            "port": state.config.port,
            "think_tags_mode": format!("{:?}", state.config.think_tags_mode).to_lowercase(),
            "anon_token_enabled": state.config.anon_token_enabled,
            "max_concurrent_requests": state.config.max_concurrent_requests,
            "debug_mode": state.config.debug_mode,
        },
    }))
}

async fn dashboard_stats_handler(State(state): State<AppState>) -> Json<crate::stats::StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn dashboard_requests_handler(
    State(state): State<AppState>,
) -> Json<Vec<crate::stats::RequestEvent>> {
    Json(state.stats.live_requests())
}

async fn dashboard_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>zgate dashboard</title>
  <style>
    body { font-family: monospace; margin: 2rem; }
    pre { background: #f5f5f5; padding: 1rem; }
  </style>
</head>
<body>
  <h1>zgate</h1>
  <h2>Stats</h2>
  <pre id="stats">loading...</pre>
  <h2>Recent requests</h2>
  <pre id="requests">loading...</pre>
  <script>
    async function refresh() {
      const stats = await (await fetch('/dashboard/stats')).json();
      document.getElementById('stats').textContent = JSON.stringify(stats, null, 2);
      const requests = await (await fetch('/dashboard/requests')).json();
      document.getElementById('requests').textContent = JSON.stringify(requests, null, 2);
    }
    refresh();
    setInterval(refresh, 2000);
  </script>
</body>
</html>
"#;
