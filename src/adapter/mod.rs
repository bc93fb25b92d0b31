//! Translation of client messages into the upstream message list.
//!
//! The upstream takes flat `{role, content}` strings. Multimodal parts are
//! flattened: text parts concatenate with single-space separators, image
//! URLs are collected as attachment candidates, and the remaining media
//! kinds travel as typed file references.


use serde_json::json;

use crate::protocol::{
    ChatMessage, ContentPart, MessageContent, ToolChoice, UpstreamMessage,
};

/// A media part the adapter recognized but does not inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    /// `image_url` part: a `data:` or `http(s)` URL to attach.
    Image { url: String },
    /// Everything else travels as a type + identifier reference.
    File { kind: &'static str, id: String },
}

/// The upstream-ready view of a client conversation.
#[derive(Debug, Clone, Default)]
pub struct AdaptedConversation {
    pub messages: Vec<UpstreamMessage>,
    pub media: Vec<MediaRef>,
}

/// Flattens client messages into the upstream message list.
pub fn adapt_messages(messages: &[ChatMessage]) -> AdaptedConversation {
    let mut adapted = AdaptedConversation::default();

    for message in messages {
        let role = normalize_role(&message.role);

        let content = match &message.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => flatten_parts(parts, &mut adapted.media),
            // Null content still produces a message; assistant turns that
            // only carry tool_calls arrive this way.
            None => String::new(),
        };

        adapted.messages.push(UpstreamMessage {
            role,
            content,
            reasoning_content: None,
        });
    }

    adapted
}

/// Normalizes a `tool_choice` for the upstream: object forms are
/// re-encoded as objects, mode strings pass through unchanged.
pub fn normalize_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => json!(mode),
        ToolChoice::Function(named) => json!({
            "type": named.kind,
            "function": { "name": named.function.name },
        }),
    }
}

fn normalize_role(role: &str) -> String {
    match role {
        "developer" => "system".to_string(),
        other => other.to_string(),
    }
}

fn flatten_parts(parts: &[ContentPart], media: &mut Vec<MediaRef>) -> String {
    let mut texts: Vec<&str> = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => texts.push(text),
            ContentPart::ImageUrl { image_url } => {
                let url = image_url.url.as_str();
                if url.starts_with("data:image/")
                    || url.starts_with("http://")
                    || url.starts_with("https://")
                {
                    media.push(MediaRef::Image {
                        url: image_url.url.clone(),
                    });
                }
            }
            ContentPart::VideoUrl { video_url } => media.push(MediaRef::File {
                kind: "video",
                id: video_url.url.clone(),
            }),
            ContentPart::DocumentUrl { document_url } => media.push(MediaRef::File {
                kind: "document",
                id: document_url.url.clone(),
            }),
            ContentPart::AudioUrl { audio_url } => media.push(MediaRef::File {
                kind: "audio",
                id: audio_url.url.clone(),
            }),
            ContentPart::File { file } => media.push(MediaRef::File {
                kind: "file",
                id: file
                    .file_id
                    .clone()
                    .or_else(|| file.filename.clone())
                    .unwrap_or_default(),
            }),
        }
    }

    texts.join(" ")
}
