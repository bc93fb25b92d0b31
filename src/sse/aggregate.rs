//! Folding a translated stream into one non-streaming response.
//!
//! Non-streaming clients still cost us a full upstream stream; the
//! translator runs exactly as it would for SSE and its events fold into
//! string builders here. The raw byte cap bounds what one request may
//! accumulate.

use std::collections::HashMap;

use super::error::AggregateError;
use super::translate::{StreamEvent, Translator};
use super::SseReader;
use crate::constants::MAX_AGGREGATE_BYTES;
use crate::protocol::{
    CompletionChoice, CompletionResponse, FunctionOut, ResponseMessage, ToolCallOut, UpstreamChunk,
    Usage,
};

/// Accumulates translated stream events.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCallOut>,
    slot_by_id: HashMap<String, usize>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    done: bool,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` trailer has been absorbed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn absorb(&mut self, event: &StreamEvent) {
        let chunk = match event {
            StreamEvent::Done => {
                self.done = true;
                return;
            }
            StreamEvent::Chunk(chunk) => chunk,
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        for choice in &chunk.choices {
            if let Some(content) = &choice.delta.content {
                self.content.push_str(content);
            }
            if let Some(reasoning) = &choice.delta.reasoning_content {
                self.reasoning.push_str(reasoning);
            }
            if let Some(tool_calls) = &choice.delta.tool_calls {
                for delta in tool_calls {
                    self.absorb_tool_delta(
                        delta.id.as_deref(),
                        delta.function.name.as_deref(),
                        delta.function.arguments.as_deref(),
                    );
                }
            }
            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }
    }

    /// Tool deltas are keyed by id; later argument payloads replace earlier
    /// ones since the assembler re-emits whole objects.
    fn absorb_tool_delta(
        &mut self,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let Some(id) = id else { return };

        let slot = match self.slot_by_id.get(id) {
            Some(&slot) => slot,
            None => {
                let slot = self.tool_calls.len();
                self.slot_by_id.insert(id.to_string(), slot);
                self.tool_calls.push(ToolCallOut {
                    id: id.to_string(),
                    kind: "function".to_string(),
                    function: FunctionOut {
                        name: String::new(),
                        arguments: String::new(),
                    },
                });
                slot
            }
        };

        let call = &mut self.tool_calls[slot];
        if let Some(name) = name {
            call.function.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            call.function.arguments = arguments.to_string();
        }
    }

    pub fn into_response(
        self,
        completion_id: &str,
        created: i64,
        model: &str,
    ) -> CompletionResponse {
        let has_tools = !self.tool_calls.is_empty();

        let finish_reason = self.finish_reason.unwrap_or_else(|| {
            if has_tools {
                "tool_calls".to_string()
            } else {
                "stop".to_string()
            }
        });

        CompletionResponse {
            id: completion_id.to_string(),
            object: "chat.completion".to_string(),
            created,
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: self.content,
                    reasoning_content: if self.reasoning.is_empty() {
                        None
                    } else {
                        Some(self.reasoning)
                    },
                    tool_calls: if has_tools { Some(self.tool_calls) } else { None },
                },
                finish_reason,
            }],
            usage: self.usage,
        }
    }
}

/// Reads an upstream stream to completion and synthesizes the single
/// response body. Enforces the raw-size cap.
pub async fn aggregate_stream(
    response: reqwest::Response,
    mut translator: Translator,
) -> Result<CompletionResponse, AggregateError> {
    let mut reader = SseReader::new(response);
    let mut builder = ResponseBuilder::new();

    loop {
        if reader.raw_bytes() > MAX_AGGREGATE_BYTES {
            return Err(AggregateError::ResponseTooLarge);
        }

        match reader.next_payload().await {
            Ok(Some(payload)) => {
                if payload == "[DONE]" {
                    for event in translator.finish() {
                        builder.absorb(&event);
                    }
                    break;
                }

                let chunk: UpstreamChunk = match serde_json::from_str(&payload) {
                    Ok(chunk) => chunk,
                    Err(_) => continue,
                };

                for event in translator.ingest(&chunk) {
                    builder.absorb(&event);
                }
                if translator.is_finished() {
                    break;
                }
            }
            Ok(None) => {
                for event in translator.finish() {
                    builder.absorb(&event);
                }
                break;
            }
            Err(error) => return Err(AggregateError::Transport(error)),
        }
    }

    Ok(builder.into_response(
        translator.completion_id(),
        translator.created(),
        translator.model(),
    ))
}
