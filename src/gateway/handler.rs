//! The chat-completions request handler.
//!
//! Per request: admission, gateway auth, validation, session binding,
//! upstream call, then either a pass-through translated SSE stream or a
//! locally aggregated JSON body. Every exit path publishes a stats event.

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use chrono::{Local, Utc};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use futures_util::StreamExt as _;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument};

use crate::adapter::{adapt_messages, normalize_tool_choice};
use crate::constants::REQUEST_DEADLINE;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::gateway::ClientMeta;
use crate::model::{build_features, prompt_variables, resolve};
use crate::protocol::{
    BackgroundTasks, ChatCompletionRequest, UpstreamFeatures, UpstreamRequest, validate,
};
use crate::sse::{StreamEvent, Translator, aggregate_stream, pump};
use crate::stats::RequestEvent;

#[instrument(skip_all, fields(model = tracing::field::Empty))]
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    Extension(meta): Extension<ClientMeta>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let request_id = meta.request_id.clone();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let permit = match state.admission.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            record_event(&state, &request_id, 429, started, &user_agent, "", false);
            return Err(ApiError::RateLimited);
        }
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim);
    if bearer != Some(state.config.api_key.as_str()) {
        record_event(&state, &request_id, 401, started, &user_agent, "", false);
        return Err(ApiError::InvalidApiKey);
    }

    let request: ChatCompletionRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(error) => {
            record_event(&state, &request_id, 400, started, &user_agent, "", false);
            return Err(ApiError::InvalidRequest {
                message: format!("invalid request body: {error}"),
                param: None,
            });
        }
    };
    tracing::Span::current().record("model", tracing::field::display(&request.model));

    let streaming = request.stream;
    if let Err(error) = validate(&request) {
        record_event(
            &state,
            &request_id,
            400,
            started,
            &user_agent,
            &request.model,
            streaming,
        );
        return Err(error.into());
    }

    let session_id = session_id_for(&request, &headers, meta.peer);
    let upstream_request = build_upstream_request(&request);

    let response = match state
        .upstream
        .call(&upstream_request, &session_id, streaming)
        .await
    {
        Ok(response) => response,
        Err(error) => {
            let api: ApiError = error.into();
            record_event(
                &state,
                &request_id,
                api.status().as_u16(),
                started,
                &user_agent,
                &request.model,
                streaming,
            );
            return Err(api);
        }
    };

    let translator = Translator::new(state.config.think_tags_mode, &request.model);

    if streaming {
        let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(64);

        let pump_state = state.clone();
        let model = request.model.clone();
        let stream_request_id = request_id.clone();
        let stream_user_agent = user_agent.clone();
        tokio::spawn(async move {
            // The permit spans the whole stream, not just the handshake.
            let _permit = permit;
            pump(response, translator, tx).await;
            record_event(
                &pump_state,
                &stream_request_id,
                200,
                started,
                &stream_user_agent,
                &model,
                true,
            );
        });

        let sse_stream = ReceiverStream::new(rx).map(|event| {
            Ok::<Event, Infallible>(match event {
                StreamEvent::Chunk(chunk) => match serde_json::to_string(&chunk) {
                    Ok(json) => Event::default().data(json),
                    Err(_) => Event::default().comment("serialization-error"),
                },
                StreamEvent::Done => Event::default().data("[DONE]"),
            })
        });

        return Ok(Sse::new(sse_stream).into_response());
    }

    let result = tokio::time::timeout(REQUEST_DEADLINE, aggregate_stream(response, translator)).await;
    drop(permit);

    match result {
        Ok(Ok(completion)) => {
            record_event(
                &state,
                &request_id,
                200,
                started,
                &user_agent,
                &request.model,
                false,
            );
            Ok(Json(completion).into_response())
        }
        Ok(Err(error)) => {
            let api: ApiError = error.into();
            record_event(
                &state,
                &request_id,
                api.status().as_u16(),
                started,
                &user_agent,
                &request.model,
                false,
            );
            Err(api)
        }
        Err(_) => {
            record_event(
                &state,
                &request_id,
                504,
                started,
                &user_agent,
                &request.model,
                false,
            );
            Err(ApiError::UpstreamTimeout)
        }
    }
}

/// Session identity: the client's `user` field when set, else the first
/// forwarded hop, else the socket peer.
fn session_id_for(
    request: &ChatCompletionRequest,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> String {
    if let Some(user) = &request.user {
        let trimmed = user.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn build_upstream_request(request: &ChatCompletionRequest) -> UpstreamRequest {
    let mapping = resolve(&request.model);
    let features = build_features(&request.model, request.stream, &mapping);
    let adapted = adapt_messages(&request.messages);
    if !adapted.media.is_empty() {
        debug!(
            media_parts = adapted.media.len(),
            "media parts recognized; attachment upload is handled separately"
        );
    }

    let mut params = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        params.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        params.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = request.max_tokens {
        params.insert("max_tokens".to_string(), json!(max_tokens));
    }

    let tools = if mapping.tools {
        request.tools.clone().filter(|tools| !tools.is_empty())
    } else {
        None
    };
    let tool_choice = tools
        .is_some()
        .then(|| request.tool_choice.as_ref().map(normalize_tool_choice))
        .flatten();

    let now_ms = Utc::now().timestamp_millis();

    UpstreamRequest {
        stream: true,
        chat_id: now_ms.to_string(),
        id: (now_ms + 1).to_string(),
        model: mapping.upstream_id.clone(),
        messages: adapted.messages,
        params,
        features: UpstreamFeatures {
            image_generation: features.image_generation,
            web_search: features.web_search,
            auto_web_search: features.auto_web_search,
            preview_mode: features.preview_mode,
            enable_thinking: features.enable_thinking,
            vision: features.vision,
            mcp_servers: features.mcp_servers,
        },
        background_tasks: BackgroundTasks::default(),
        variables: prompt_variables(Local::now()),
        tools,
        tool_choice,
    }
}

fn record_event(
    state: &AppState,
    request_id: &str,
    status: u16,
    started: Instant,
    user_agent: &str,
    model: &str,
    streaming: bool,
) {
    state.stats.record(RequestEvent {
        id: request_id.to_string(),
        timestamp: Utc::now().timestamp(),
        method: "POST".to_string(),
        path: "/v1/chat/completions".to_string(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
        user_agent: user_agent.to_string(),
        model: model.to_string(),
        streaming,
    });
}
