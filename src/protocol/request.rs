//! Client-facing chat-completion request types and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    MAX_MESSAGE_BYTES, MAX_TOOLS, MAX_TOOLS_BINDING, MAX_TOTAL_CONTENT_BYTES,
};

/// A request failed a business rule; `param` names the offending field.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub param: &'static str,
}

impl ValidationError {
    fn new(param: &'static str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            param,
        }
    }
}

/// `POST /v1/chat/completions` body in the OpenAI dialect.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content: a bare string or a list of typed parts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: MediaUrl },
    VideoUrl { video_url: MediaUrl },
    DocumentUrl { document_url: MediaUrl },
    AudioUrl { audio_url: MediaUrl },
    File { file: FileRef },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// `tool_choice`: a mode string or an object naming one function.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function(NamedToolChoice),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamedToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionName,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionName {
    pub name: String,
}

const VALID_ROLES: &[&str] = &["system", "user", "assistant", "developer", "tool"];

/// Validates the business rules on a parsed request.
pub fn validate(request: &ChatCompletionRequest) -> Result<(), ValidationError> {
    if request.model.trim().is_empty() {
        return Err(ValidationError::new("model", "model must be non-empty"));
    }

    if request.messages.is_empty() {
        return Err(ValidationError::new(
            "messages",
            "messages must be non-empty",
        ));
    }

    let mut total_bytes = 0usize;
    for (i, message) in request.messages.iter().enumerate() {
        if !VALID_ROLES.contains(&message.role.as_str()) {
            return Err(ValidationError::new(
                "messages",
                format!("messages[{i}].role '{}' is not supported", message.role),
            ));
        }

        for text in message_texts(message) {
            if text.len() > MAX_MESSAGE_BYTES {
                return Err(ValidationError::new(
                    "messages",
                    format!(
                        "messages[{i}] content exceeds {MAX_MESSAGE_BYTES} bytes"
                    ),
                ));
            }
            total_bytes += text.len();
        }
    }

    if total_bytes > MAX_TOTAL_CONTENT_BYTES {
        return Err(ValidationError::new(
            "messages",
            format!("total content exceeds {MAX_TOTAL_CONTENT_BYTES} bytes"),
        ));
    }

    if let Some(t) = request.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ValidationError::new(
                "temperature",
                "temperature must be between 0 and 2",
            ));
        }
    }

    if let Some(p) = request.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::new("top_p", "top_p must be between 0 and 1"));
        }
    }

    if let Some(m) = request.max_tokens {
        if m == 0 || m > 240_000 {
            return Err(ValidationError::new(
                "max_tokens",
                "max_tokens must be between 1 and 240000",
            ));
        }
    }

    if let Some(l) = request.top_logprobs {
        if l > 5 {
            return Err(ValidationError::new(
                "top_logprobs",
                "top_logprobs must be between 0 and 5",
            ));
        }
    }

    if let Some(tools) = &request.tools {
        // The binding ceiling is wider than the business ceiling; the
        // business one dominates but both are checked to keep the
        // boundary explicit.
        if tools.len() > MAX_TOOLS_BINDING {
            return Err(ValidationError::new(
                "tools",
                format!("at most {MAX_TOOLS_BINDING} tools are accepted"),
            ));
        }
        if tools.len() > MAX_TOOLS {
            return Err(ValidationError::new(
                "tools",
                format!("at most {MAX_TOOLS} tools are supported"),
            ));
        }
    }

    Ok(())
}

fn message_texts(message: &ChatMessage) -> Vec<&str> {
    match &message.content {
        Some(MessageContent::Text(text)) => vec![text.as_str()],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect(),
        None => Vec::new(),
    }
}
