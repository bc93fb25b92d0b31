//! Phase-driven translation of upstream chunks into OpenAI chunks.
//!
//! The upstream declares a phase per chunk (`thinking`, `answer`,
//! `tool_call`, `done`); the translator walks those phases and emits
//! OpenAI-shaped deltas: `reasoning_content` while thinking, `content`
//! while answering, reconstructed `tool_calls` from positional edits, and
//! a terminal chunk plus the `[DONE]` trailer at the end. Think-tag
//! balancing happens at finalization so truncated reasoning still closes.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::tags::rewrite_thinking;
use super::tools::{ToolAssembler, ToolEvent};
use crate::config::ThinkTagsMode;
use crate::protocol::{
    ChunkChoice, ChunkResponse, Delta, FunctionDelta, Phase, ToolCallDelta, UpstreamChunk, Usage,
};

/// One unit of client-facing output.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(ChunkResponse),
    /// The literal `data: [DONE]` trailer.
    Done,
}

/// Translation state for one request's stream.
pub struct Translator {
    mode: ThinkTagsMode,
    completion_id: String,
    created: i64,
    model: String,
    phase: Phase,
    sent_role: bool,
    saw_answer_edit: bool,
    think_opens: usize,
    think_closes: usize,
    usage: Option<Usage>,
    tools: ToolAssembler,
    finished: bool,
}

impl Translator {
    pub fn new(mode: ThinkTagsMode, model: &str) -> Self {
        Self {
            mode,
            completion_id: format!("chatcmpl-{}", Uuid::new_v4()),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            phase: Phase::Other,
            sent_role: false,
            saw_answer_edit: false,
            think_opens: 0,
            think_closes: 0,
            usage: None,
            tools: ToolAssembler::new(),
            finished: false,
        }
    }

    pub fn completion_id(&self) -> &str {
        &self.completion_id
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the terminal chunk and trailer have been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether any tool-call start has been announced.
    pub fn emitted_tool_calls(&self) -> bool {
        self.tools.started_any()
    }

    /// Consumes one upstream chunk and returns the chunks to forward.
    pub fn ingest(&mut self, chunk: &UpstreamChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        if let Some(error) = chunk.first_error() {
            warn!(error = %error.describe(), "upstream reported an in-stream error");
            return self.terminate("stop");
        }

        let Some(data) = &chunk.data else {
            return Vec::new();
        };

        if let Some(usage) = &data.usage {
            if usage.total_tokens > 0 {
                self.usage = Some(*usage);
            }
        }

        let phase = data.phase.unwrap_or(self.phase);
        self.phase = phase;

        let mut events = Vec::new();

        match phase {
            Phase::Thinking => {
                if let Some(delta) = &data.delta_content {
                    if !delta.is_empty() {
                        let rewritten = rewrite_thinking(delta, self.mode);
                        self.think_opens += rewritten.matches("<think>").count();
                        self.think_closes += rewritten.matches("</think>").count();
                        if !rewritten.is_empty() {
                            events.push(self.delta_event(Delta {
                                reasoning_content: Some(rewritten),
                                ..Default::default()
                            }));
                        }
                    }
                }
            }
            Phase::Answer => {
                if let Some(edit) = &data.edit_content {
                    if data.edit_index.is_some() || edit.contains("<glm_block") {
                        // Tool blocks ride answer-phase edits too.
                        let tool_events =
                            self.tools.apply_edit(data.edit_index.unwrap_or(0), edit);
                        events.extend(self.tool_chunks(tool_events));
                    } else if !self.saw_answer_edit {
                        self.saw_answer_edit = true;
                        // The first edit replays the thinking wrapper; only
                        // what follows the closing tag is answer content.
                        let content = edit
                            .splitn(2, "</details>")
                            .last()
                            .unwrap_or_default()
                            .to_string();
                        if !content.is_empty() {
                            events.push(self.delta_event(Delta {
                                content: Some(content),
                                ..Default::default()
                            }));
                        }
                    }
                }
                if let Some(delta) = &data.delta_content {
                    if !delta.is_empty() {
                        events.push(self.delta_event(Delta {
                            content: Some(delta.clone()),
                            ..Default::default()
                        }));
                    }
                }
            }
            Phase::ToolCall => {
                if let Some(edit) = &data.edit_content {
                    let tool_events = self.tools.apply_edit(data.edit_index.unwrap_or(0), edit);
                    events.extend(self.tool_chunks(tool_events));
                }
            }
            Phase::Done => {
                events.extend(self.finalize());
                return events;
            }
            Phase::Other => {
                debug!("ignoring chunk in unrecognized phase");
            }
        }

        if data.done == Some(true) {
            events.extend(self.finalize());
        }

        events
    }

    /// Clean end of input (upstream `[DONE]` or EOF) without a done chunk.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finalize()
    }

    /// Mid-stream failure: close out with `finish_reason: "stop"`.
    pub fn abort(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.terminate("stop")
    }

    fn finalize(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let tool_events = self.tools.finish();
        events.extend(self.tool_chunks(tool_events));

        events.extend(self.balance_think_tags());

        let finish_reason = if self.tools.started_any() {
            "tool_calls"
        } else {
            "stop"
        };

        events.extend(self.terminal_events(finish_reason));
        events
    }

    fn terminate(&mut self, finish_reason: &str) -> Vec<StreamEvent> {
        let mut events = self.balance_think_tags();
        events.extend(self.terminal_events(finish_reason));
        events
    }

    fn terminal_events(&mut self, finish_reason: &str) -> Vec<StreamEvent> {
        let mut terminal = ChunkResponse::new(
            &self.completion_id,
            self.created,
            &self.model,
            ChunkChoice {
                index: 0,
                delta: Delta::default(),
                finish_reason: Some(finish_reason.to_string()),
            },
        );
        terminal.usage = self.usage;
        self.finished = true;
        vec![StreamEvent::Chunk(terminal), StreamEvent::Done]
    }

    /// Appends the `</think>` closes a truncated stream owes. Excess closes
    /// cannot be unsent and are only logged.
    fn balance_think_tags(&mut self) -> Vec<StreamEvent> {
        if self.think_opens > self.think_closes {
            let missing = self.think_opens - self.think_closes;
            self.think_closes = self.think_opens;
            return vec![self.delta_event(Delta {
                reasoning_content: Some("</think>".repeat(missing)),
                ..Default::default()
            })];
        }

        if self.think_closes > self.think_opens {
            warn!(
                opens = self.think_opens,
                closes = self.think_closes,
                "reasoning stream closed more think tags than it opened"
            );
        }

        Vec::new()
    }

    fn delta_event(&mut self, mut delta: Delta) -> StreamEvent {
        if !self.sent_role {
            self.sent_role = true;
            delta.role = Some("assistant".to_string());
        }

        StreamEvent::Chunk(ChunkResponse::new(
            &self.completion_id,
            self.created,
            &self.model,
            ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            },
        ))
    }

    fn tool_chunks(&mut self, tool_events: Vec<ToolEvent>) -> Vec<StreamEvent> {
        tool_events
            .into_iter()
            .map(|event| match event {
                ToolEvent::Start {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    self.sent_role = true;
                    StreamEvent::Chunk(ChunkResponse::new(
                        &self.completion_id,
                        self.created,
                        &self.model,
                        ChunkChoice {
                            index: 0,
                            delta: Delta {
                                role: Some("assistant".to_string()),
                                tool_calls: Some(vec![ToolCallDelta {
                                    index: index as u32,
                                    id: Some(id),
                                    kind: Some("function".to_string()),
                                    function: FunctionDelta {
                                        name: Some(name),
                                        arguments: Some(arguments),
                                    },
                                }]),
                                ..Default::default()
                            },
                            finish_reason: None,
                        },
                    ))
                }
                ToolEvent::ArgumentsDelta {
                    index,
                    id,
                    arguments,
                } => StreamEvent::Chunk(ChunkResponse::new(
                    &self.completion_id,
                    self.created,
                    &self.model,
                    ChunkChoice {
                        index: 0,
                        delta: Delta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: index as u32,
                                id: Some(id),
                                kind: None,
                                function: FunctionDelta {
                                    name: None,
                                    arguments: Some(arguments),
                                },
                            }]),
                            ..Default::default()
                        },
                        finish_reason: None,
                    },
                )),
            })
            .collect()
    }
}
