//! Tool-call reconstruction from positional edits.
//!
//! The upstream does not stream tool calls as forwardable JSON. It sends
//! `(edit_index, edit_content)` pairs that overwrite byte ranges of a
//! growing scratch buffer; the assembled buffer contains
//! `<glm_block>…</glm_block>` regions whose inner JSON describes one tool
//! call each. Blocks arrive truncated mid-stream, so parsing is a ladder of
//! repairs and the emission side holds a call back until its arguments look
//! complete. A start chunk for a given tool id is emitted at most once.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static GLM_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<glm_block\s*>(.*?)(</glm_block>|$)").expect("static regex"));

static FIELD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""id"\s*:\s*"([^"]*)""#).expect("static regex"));
static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name"\s*:\s*"([^"]*)""#).expect("static regex"));
static FIELD_ARGUMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""arguments"\s*:\s*"((?:[^"\\]|\\.)*)"#).expect("static regex"));

static SALVAGE_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"\s*:\s*"([^"]*)""#).expect("static regex"));
static SALVAGE_SCALAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"\s*:\s*(-?\d+|true|false)"#).expect("static regex")
});

/// Markers that tell us the upstream finished writing a tool-call region.
const TERMINATION_MARKERS: &[&str] = &[
    r#""status": "completed""#,
    r#""status":"completed""#,
    r#""is_error": false"#,
    r#""is_error":false"#,
    "null,",
];

/// Suffixes that mark a string value as probably truncated (URLs and paths
/// sliced mid-edit).
const TRUNCATION_SUFFIXES: &[&str] = &[".", "/", ":", "=", ".go", ".goo", ".com/", "http"];

/// State of one tool call being reassembled.
#[derive(Debug, Clone)]
pub struct ActiveToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub arguments_raw: String,
    pub sent_start: bool,
    pub last_sent_args: Map<String, Value>,
    pub args_complete: bool,
}

/// An emission decision made by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEvent {
    /// First (and only) start chunk for this id; arguments are a complete
    /// JSON-encoded object.
    Start {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },
    /// The arguments improved significantly after the start was sent.
    ArgumentsDelta {
        index: usize,
        id: String,
        arguments: String,
    },
}

/// Reassembles tool calls for one request.
#[derive(Debug, Default)]
pub struct ToolAssembler {
    buffer: Vec<u8>,
    calls: Vec<ActiveToolCall>,
    index_by_id: HashMap<String, usize>,
    started_any: bool,
}

impl ToolAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any start chunk has been emitted.
    pub fn started_any(&self) -> bool {
        self.started_any
    }

    /// The calls that were announced to the client, in emission order.
    pub fn emitted_calls(&self) -> Vec<&ActiveToolCall> {
        self.calls.iter().filter(|c| c.sent_start).collect()
    }

    /// Applies one positional edit and returns whatever became emittable.
    pub fn apply_edit(&mut self, edit_index: usize, edit_content: &str) -> Vec<ToolEvent> {
        self.write_at(edit_index, edit_content.as_bytes());
        let text = String::from_utf8_lossy(&self.buffer).into_owned();

        let mut events = self.scan_blocks(&text);

        if TERMINATION_MARKERS.iter().any(|m| text.contains(m)) {
            events.extend(self.flush_pending(false));
        }

        events
    }

    /// Stream end: force out anything with usable arguments.
    pub fn finish(&mut self) -> Vec<ToolEvent> {
        self.flush_pending(true)
    }

    /// Right-pads with zero bytes to `index`, then overwrites (not inserts).
    fn write_at(&mut self, index: usize, content: &[u8]) {
        if self.buffer.len() < index {
            self.buffer.resize(index, 0);
        }
        let end = index + content.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[index..end].copy_from_slice(content);
    }

    fn scan_blocks(&mut self, text: &str) -> Vec<ToolEvent> {
        let mut events = Vec::new();

        for capture in GLM_BLOCK.captures_iter(text) {
            let raw_block = &capture[1];
            let Some(candidate) = parse_block(raw_block) else {
                continue;
            };
            events.extend(self.absorb(candidate));
        }

        events
    }

    fn absorb(&mut self, candidate: BlockCandidate) -> Vec<ToolEvent> {
        let arguments = parse_arguments(&candidate.arguments_raw).unwrap_or_default();
        let complete = arguments_complete(&arguments, &candidate.arguments_raw);

        let slot = match self.index_by_id.get(&candidate.id) {
            Some(&slot) => slot,
            None => {
                let slot = self.calls.len();
                self.index_by_id.insert(candidate.id.clone(), slot);
                self.calls.push(ActiveToolCall {
                    id: candidate.id.clone(),
                    name: candidate.name.clone(),
                    arguments: Map::new(),
                    arguments_raw: String::new(),
                    sent_start: false,
                    last_sent_args: Map::new(),
                    args_complete: false,
                });
                slot
            }
        };

        let call = &mut self.calls[slot];
        if !candidate.name.is_empty() {
            call.name = candidate.name;
        }
        call.arguments_raw = candidate.arguments_raw;
        call.args_complete = complete;
        if !arguments.is_empty() {
            call.arguments = arguments;
        }

        let mut events = Vec::new();
        if !call.sent_start {
            if call.args_complete {
                call.sent_start = true;
                call.last_sent_args = call.arguments.clone();
                self.started_any = true;
                events.push(ToolEvent::Start {
                    index: slot,
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                });
            }
        } else if significant_improvement(&call.last_sent_args, &call.arguments) {
            call.last_sent_args = call.arguments.clone();
            events.push(ToolEvent::ArgumentsDelta {
                index: slot,
                id: call.id.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            });
        }

        events
    }

    fn flush_pending(&mut self, stream_ended: bool) -> Vec<ToolEvent> {
        let mut events = Vec::new();

        for (slot, call) in self.calls.iter_mut().enumerate() {
            if call.sent_start {
                continue;
            }
            let usable = call.args_complete || (stream_ended && !call.arguments.is_empty());
            if !usable {
                if stream_ended {
                    debug!(id = %call.id, "dropping tool call with unusable arguments");
                }
                continue;
            }
            call.sent_start = true;
            call.last_sent_args = call.arguments.clone();
            self.started_any = true;
            events.push(ToolEvent::Start {
                index: slot,
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            });
        }

        events
    }
}

struct BlockCandidate {
    id: String,
    name: String,
    arguments_raw: String,
}

/// Parses one block body: JSON first (after brace repair), regex salvage
/// second.
fn parse_block(raw: &str) -> Option<BlockCandidate> {
    if let Some(candidate) = parse_block_json(raw) {
        return Some(candidate);
    }

    let id = FIELD_ID.captures(raw)?.get(1)?.as_str().to_string();
    if id.is_empty() {
        return None;
    }
    let name = FIELD_NAME
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let arguments_raw = FIELD_ARGUMENTS
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("\\\"", "\""))
        .unwrap_or_default();

    Some(BlockCandidate {
        id,
        name,
        arguments_raw,
    })
}

fn parse_block_json(raw: &str) -> Option<BlockCandidate> {
    let repaired = strip_excess_braces(raw.trim());
    let value: Value = serde_json::from_str(&repaired).ok()?;
    let metadata = value.pointer("/data/metadata")?;

    let id = metadata.get("id")?.as_str()?.to_string();
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments_raw = match metadata.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Some(BlockCandidate {
        id,
        name,
        arguments_raw,
    })
}

/// Drops trailing `}` beyond what the `{` count supports.
fn strip_excess_braces(raw: &str) -> String {
    let open = raw.matches('{').count();
    let close = raw.matches('}').count();
    let mut repaired = raw.to_string();
    let mut excess = close.saturating_sub(open);
    while excess > 0 && repaired.trim_end().ends_with('}') {
        let trimmed_len = repaired.trim_end().len();
        repaired.truncate(trimmed_len - 1);
        excess -= 1;
    }
    repaired
}

/// The argument-string normalization ladder.
///
/// Arguments arrive as bare JSON, quoted JSON or escaped JSON depending on
/// which edit landed last. Try progressively stronger normalizations, then
/// fall back to salvaging recognizable pairs.
pub(crate) fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }

    // One enclosing quote layer, then unescape inner quotes.
    let mut candidate = trimmed.to_string();
    if candidate.len() >= 2
        && ((candidate.starts_with('"') && candidate.ends_with('"'))
            || (candidate.starts_with('\'') && candidate.ends_with('\'')))
    {
        candidate = candidate[1..candidate.len() - 1].to_string();
    }
    candidate = candidate.replace("\\\"", "\"").replace("\\\\", "\\");

    if !candidate.starts_with('{') {
        candidate.insert(0, '{');
    }
    if !candidate.ends_with('}') {
        // Balance quotes before closing so a sliced string value still
        // parses.
        if candidate.matches('"').count() % 2 == 1 {
            candidate.push('"');
        }
        candidate.push('}');
    }

    if let Ok(Value::Object(map)) = serde_json::from_str(&candidate) {
        return Some(map);
    }

    salvage_pairs(&candidate)
}

/// Best effort: pick out `"key":"value"`, `"key":<int>` and `"key":<bool>`
/// pairs from an unparseable fragment.
fn salvage_pairs(fragment: &str) -> Option<Map<String, Value>> {
    let mut map = Map::new();

    for capture in SALVAGE_STRING.captures_iter(fragment) {
        let key = capture[1].to_string();
        if key == "id" || key == "name" || key == "arguments" {
            continue;
        }
        map.insert(key, Value::String(capture[2].to_string()));
    }

    for capture in SALVAGE_SCALAR.captures_iter(fragment) {
        let key = capture[1].to_string();
        let value = &capture[2];
        let parsed = if value == "true" {
            Value::Bool(true)
        } else if value == "false" {
            Value::Bool(false)
        } else {
            match value.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => continue,
            }
        };
        map.entry(key).or_insert(parsed);
    }

    if map.is_empty() { None } else { Some(map) }
}

/// Whether a parsed argument object looks finished.
fn arguments_complete(arguments: &Map<String, Value>, raw: &str) -> bool {
    if arguments.is_empty() {
        return false;
    }

    let trimmed = raw.trim_end();
    if !(trimmed.ends_with('}') || trimmed.ends_with('"')) {
        return false;
    }

    arguments
        .values()
        .all(|value| !value_truncated(value))
}

fn value_truncated(value: &Value) -> bool {
    match value {
        Value::String(s) => TRUNCATION_SUFFIXES.iter().any(|suffix| s.ends_with(suffix)),
        _ => false,
    }
}

/// A delta is worth sending only if it adds a key, grows a string value by
/// at least five characters, or completes a previously truncated value.
fn significant_improvement(old: &Map<String, Value>, new: &Map<String, Value>) -> bool {
    if new.keys().any(|k| !old.contains_key(k)) {
        return true;
    }

    for (key, new_value) in new {
        let Some(old_value) = old.get(key) else {
            continue;
        };
        if let (Value::String(old_s), Value::String(new_s)) = (old_value, new_value) {
            if new_s.len() >= old_s.len() + 5 {
                return true;
            }
            if value_truncated(old_value) && !value_truncated(new_value) && old_s != new_s {
                return true;
            }
        }
    }

    false
}
