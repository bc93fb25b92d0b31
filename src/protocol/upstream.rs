//! Upstream request body and SSE chunk shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::request::ToolDefinition;

/// The body posted to the upstream chat endpoint. Always `stream: true`;
/// aggregation happens on our side.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub stream: bool,
    pub chat_id: String,
    pub id: String,
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub features: UpstreamFeatures,
    pub background_tasks: BackgroundTasks,
    pub variables: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamFeatures {
    pub image_generation: bool,
    pub web_search: bool,
    pub auto_web_search: bool,
    pub preview_mode: bool,
    pub enable_thinking: bool,
    pub vision: bool,
    pub mcp_servers: Vec<String>,
}

/// Always disabled; the gateway has no use for upstream-side titles/tags.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct BackgroundTasks {
    pub title_generation: bool,
    pub tags_generation: bool,
}

/// The upstream's self-declared state for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Thinking,
    Answer,
    ToolCall,
    Done,
    #[default]
    #[serde(other)]
    Other,
}

/// One decoded `data:` payload from the upstream SSE stream.
///
/// Error objects can appear at three nesting levels (`error`,
/// `data.error`, `data.inner.error`); consumers must check all three.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChunk {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<UpstreamChunkData>,
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChunkData {
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub delta_content: Option<String>,
    #[serde(default)]
    pub edit_content: Option<String>,
    #[serde(default)]
    pub edit_index: Option<usize>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
    #[serde(default)]
    pub inner: Option<UpstreamInner>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamInner {
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl UpstreamErrorBody {
    /// Best human-readable description available.
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.detail.clone())
            .unwrap_or_else(|| "upstream error".to_string())
    }
}

impl UpstreamChunk {
    /// Returns the first error found at any of the three nesting levels.
    pub fn first_error(&self) -> Option<&UpstreamErrorBody> {
        if let Some(e) = &self.error {
            return Some(e);
        }
        if let Some(data) = &self.data {
            if let Some(e) = &data.error {
                return Some(e);
            }
            if let Some(e) = data.inner.as_ref().and_then(|i| i.error.as_ref()) {
                return Some(e);
            }
        }
        None
    }
}

/// Token accounting as reported by the upstream and re-emitted to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}
