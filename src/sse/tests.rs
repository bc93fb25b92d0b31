use super::aggregate::ResponseBuilder;
use super::tools::{ToolAssembler, ToolEvent};
use super::translate::{StreamEvent, Translator};
use crate::config::ThinkTagsMode;
use crate::protocol::UpstreamChunk;

fn upstream_chunk(data: serde_json::Value) -> UpstreamChunk {
    serde_json::from_value(serde_json::json!({ "type": "chat", "data": data })).expect("chunk")
}

fn chunks_of(events: &[StreamEvent]) -> Vec<&crate::protocol::ChunkResponse> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(c) => Some(c),
            StreamEvent::Done => None,
        })
        .collect()
}

fn glm_block(id: &str, name: &str, arguments: &str) -> String {
    let escaped = arguments.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"<glm_block>{{"type":"tool_call","data":{{"metadata":{{"id":"{id}","name":"{name}","arguments":"{escaped}"}},"status":"pending"}}}}</glm_block>"#
    )
}

// --- Translator -----------------------------------------------------------

#[test]
fn test_answer_stream_round_trip() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let mut events = Vec::new();

    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "answer", "delta_content": "Hello, "
    }))));
    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "answer", "delta_content": "how can I help you?"
    }))));
    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "done", "done": true,
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))));

    let chunks = chunks_of(&events);
    assert_eq!(chunks.len(), 3);

    assert_eq!(
        chunks[0].choices[0].delta.role.as_deref(),
        Some("assistant"),
        "role rides the first delta"
    );
    assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("Hello, "));
    assert!(chunks[1].choices[0].delta.role.is_none());
    assert_eq!(
        chunks[1].choices[0].delta.content.as_deref(),
        Some("how can I help you?")
    );

    let terminal = chunks[2];
    assert!(terminal.choices[0].delta.is_empty());
    assert_eq!(terminal.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(terminal.usage.unwrap().total_tokens, 15);

    assert!(matches!(events.last(), Some(StreamEvent::Done)));
    assert!(translator.is_finished());

    // Ingesting past the end is a no-op.
    assert!(
        translator
            .ingest(&upstream_chunk(serde_json::json!({
                "phase": "answer", "delta_content": "late"
            })))
            .is_empty()
    );
}

#[test]
fn test_thinking_rewrites_and_balances() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let mut events = Vec::new();

    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "thinking",
        "delta_content": "<details type=\"reasoning\"><summary>Thinking</summary>\n> Let me think"
    }))));
    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "answer", "delta_content": "Here's the explanation"
    }))));
    // Stream ends while the think tag is still open.
    events.extend(translator.finish());

    let chunks = chunks_of(&events);
    let reasoning: String = chunks
        .iter()
        .filter_map(|c| c.choices[0].delta.reasoning_content.clone())
        .collect();

    assert!(reasoning.contains("<think>"));
    assert_eq!(
        reasoning.matches("<think>").count(),
        reasoning.matches("</think>").count(),
        "finalization balances the open tag"
    );

    let content: String = chunks
        .iter()
        .filter_map(|c| c.choices[0].delta.content.clone())
        .collect();
    assert_eq!(content, "Here's the explanation");
}

#[test]
fn test_first_answer_edit_splits_on_details_close() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");

    let events = translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "answer",
        "edit_content": "<details>old reasoning</details>The actual answer"
    })));

    let chunks = chunks_of(&events);
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].choices[0].delta.content.as_deref(),
        Some("The actual answer")
    );
}

#[test]
fn test_error_aborts_at_every_nesting_level() {
    let payloads = [
        serde_json::json!({"error": {"message": "top level"}}),
        serde_json::json!({"data": {"error": {"detail": "data level"}}}),
        serde_json::json!({"data": {"inner": {"error": {"message": "inner level"}}}}),
    ];

    for payload in payloads {
        let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
        let chunk: UpstreamChunk = serde_json::from_value(payload).expect("chunk");
        let events = translator.ingest(&chunk);

        let chunks = chunks_of(&events);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        assert!(translator.is_finished());
    }
}

#[test]
fn test_tool_call_stream_finishes_with_tool_calls() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let block = glm_block("call_1", "get_weather", r#"{"location":"Beijing"}"#);

    let mut events = Vec::new();
    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "tool_call", "edit_content": block, "edit_index": 0
    }))));
    events.extend(translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "done", "done": true
    }))));

    let chunks = chunks_of(&events);

    let starts: Vec<_> = chunks
        .iter()
        .filter(|c| c.choices[0].delta.tool_calls.is_some())
        .collect();
    assert_eq!(starts.len(), 1);

    let tool_calls = starts[0].choices[0].delta.tool_calls.as_ref().unwrap();
    assert_eq!(tool_calls[0].id.as_deref(), Some("call_1"));
    assert_eq!(tool_calls[0].function.name.as_deref(), Some("get_weather"));
    let arguments: serde_json::Value =
        serde_json::from_str(tool_calls[0].function.arguments.as_deref().unwrap()).unwrap();
    assert_eq!(arguments, serde_json::json!({"location": "Beijing"}));

    let terminal = chunks.last().unwrap();
    assert_eq!(
        terminal.choices[0].finish_reason.as_deref(),
        Some("tool_calls")
    );
}

#[test]
fn test_answer_phase_edit_with_index_feeds_assembler() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let block = glm_block("call_2", "search", r#"{"q":"rust"}"#);

    let events = translator.ingest(&upstream_chunk(serde_json::json!({
        "phase": "answer", "edit_content": block, "edit_index": 0
    })));

    let chunks = chunks_of(&events);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].choices[0].delta.tool_calls.is_some());
}

// --- ToolAssembler --------------------------------------------------------

#[test]
fn test_tool_assembly_emits_start_once() {
    let mut assembler = ToolAssembler::new();
    let block = glm_block("call_1", "search", r#"{"q":"hi"}"#);

    let events = assembler.apply_edit(0, &block);
    let starts: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ToolEvent::Start { .. }))
        .collect();
    assert_eq!(starts.len(), 1);
    match starts[0] {
        ToolEvent::Start { id, arguments, .. } => {
            assert_eq!(id, "call_1");
            let parsed: serde_json::Value = serde_json::from_str(arguments).unwrap();
            assert_eq!(parsed, serde_json::json!({"q": "hi"}));
        }
        _ => unreachable!(),
    }

    // Termination marker re-scans the same block; no second start.
    let tail = format!("{block}{}", r#"{"status": "completed"}"#);
    let events = assembler.apply_edit(0, &tail);
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, ToolEvent::Start { .. })),
        "start chunks are at-most-once per id"
    );
    assert!(assembler.finish().is_empty());
}

#[test]
fn test_positional_edits_overwrite_not_insert() {
    let mut assembler = ToolAssembler::new();
    let block = glm_block("call_1", "lookup", r#"{"key":"value"}"#);
    let (first, second) = block.split_at(block.len() / 2);

    assert!(assembler.apply_edit(0, first).is_empty(), "half a block");

    let events = assembler.apply_edit(first.len(), second);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ToolEvent::Start { .. }))
            .count(),
        1
    );

    // Overwriting the same range with identical bytes changes nothing.
    assert!(assembler.apply_edit(0, &block).is_empty());
}

#[test]
fn test_truncated_arguments_held_back_until_finish() {
    let mut assembler = ToolAssembler::new();
    let block = glm_block("call_1", "fetch", r#"{"url":"https://example.com/"#);

    let events = assembler.apply_edit(0, &block);
    assert!(events.is_empty(), "truncated URL must not be announced");

    let events = assembler.finish();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ToolEvent::Start { arguments, .. } => {
            let parsed: serde_json::Value = serde_json::from_str(arguments).unwrap();
            assert_eq!(parsed["url"], "https://example.com/");
        }
        other => panic!("expected start, got {other:?}"),
    }
}

#[test]
fn test_arguments_completing_triggers_start() {
    let mut assembler = ToolAssembler::new();

    let truncated = glm_block("call_1", "fetch", r#"{"url":"https://example.com/"#);
    assert!(assembler.apply_edit(0, &truncated).is_empty());

    let complete = glm_block("call_1", "fetch", r#"{"url":"https://example.com/page"}"#);
    let events = assembler.apply_edit(0, &complete);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ToolEvent::Start { .. }))
            .count(),
        1
    );
}

#[test]
fn test_multiple_blocks_multiple_calls() {
    let mut assembler = ToolAssembler::new();
    let both = format!(
        "{}{}",
        glm_block("call_1", "first", r#"{"a":"1"}"#),
        glm_block("call_2", "second", r#"{"b":"2"}"#)
    );

    let events = assembler.apply_edit(0, &both);
    let starts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ToolEvent::Start { index, id, .. } => Some((*index, id.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        starts,
        vec![(0, "call_1".to_string()), (1, "call_2".to_string())]
    );
}

#[test]
fn test_argument_delta_on_significant_improvement() {
    let mut assembler = ToolAssembler::new();

    let initial = glm_block("call_1", "search", r#"{"q":"hi"}"#);
    assembler.apply_edit(0, &initial);

    // A new key is a significant improvement.
    let improved = glm_block("call_1", "search", r#"{"q":"hi","page":"2"}"#);
    let events = assembler.apply_edit(0, &improved);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ToolEvent::ArgumentsDelta { .. }))
            .count(),
        1
    );

    // Re-applying the same content is not an improvement.
    assert!(assembler.apply_edit(0, &improved).is_empty());
}

#[test]
fn test_regex_salvage_for_malformed_blocks() {
    let mut assembler = ToolAssembler::new();
    // Not valid JSON at all, and the block never closes.
    let fragment =
        r#"<glm_block>!! "id":"call_9", "name":"lookup", "arguments":"{\"k\":\"v\"}" trailing"#;

    let events = assembler.apply_edit(0, fragment);
    let starts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ToolEvent::Start { id, name, arguments, .. } => {
                Some((id.clone(), name.clone(), arguments.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].0, "call_9");
    assert_eq!(starts[0].1, "lookup");
    let parsed: serde_json::Value = serde_json::from_str(&starts[0].2).unwrap();
    assert_eq!(parsed, serde_json::json!({"k": "v"}));
}

#[test]
fn test_argument_parsing_ladder() {
    use super::tools::parse_arguments;

    // Bare JSON.
    let map = parse_arguments(r#"{"a":"b"}"#).unwrap();
    assert_eq!(map["a"], "b");

    // One enclosing quote layer with escaped inner quotes.
    let map = parse_arguments(r#""{\"a\":\"b\"}""#).unwrap();
    assert_eq!(map["a"], "b");

    // Missing braces and an unbalanced quote.
    let map = parse_arguments(r#""q":"unfinished"#).unwrap();
    assert_eq!(map["q"], "unfinished");

    // Hopeless fragment: salvage picks out recognizable pairs.
    let map = parse_arguments(r#"{"q":"hi" ???? "n":5 "flag":true"#).unwrap();
    assert_eq!(map["q"], "hi");
    assert_eq!(map["n"], 5);
    assert_eq!(map["flag"], true);

    assert!(parse_arguments("").is_none());
}

// --- ResponseBuilder ------------------------------------------------------

#[test]
fn test_aggregation_round_trip() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let mut builder = ResponseBuilder::new();

    for data in [
        serde_json::json!({"phase": "answer", "delta_content": "Hello, "}),
        serde_json::json!({"phase": "answer", "delta_content": "how can I help you?"}),
        serde_json::json!({
            "phase": "done", "done": true,
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }),
    ] {
        for event in translator.ingest(&upstream_chunk(data)) {
            builder.absorb(&event);
        }
    }

    assert!(builder.is_done());
    let response = builder.into_response("chatcmpl-test", 123, "glm-4.5");

    assert_eq!(response.choices[0].message.content, "Hello, how can I help you?");
    assert_eq!(response.choices[0].finish_reason, "stop");
    assert_eq!(response.usage.unwrap().total_tokens, 15);
    assert!(response.choices[0].message.tool_calls.is_none());
    assert_eq!(response.object, "chat.completion");
}

#[test]
fn test_aggregation_with_tool_calls() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let mut builder = ResponseBuilder::new();

    let block = glm_block("call_1", "get_weather", r#"{"location":"Beijing"}"#);
    for data in [
        serde_json::json!({"phase": "tool_call", "edit_content": block, "edit_index": 0}),
        serde_json::json!({"phase": "done", "done": true}),
    ] {
        for event in translator.ingest(&upstream_chunk(data)) {
            builder.absorb(&event);
        }
    }

    let response = builder.into_response("chatcmpl-test", 123, "glm-4.5");
    assert_eq!(response.choices[0].finish_reason, "tool_calls");

    let tool_calls = response.choices[0].message.tool_calls.as_ref().unwrap();
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].id, "call_1");
    assert_eq!(tool_calls[0].function.name, "get_weather");
    let arguments: serde_json::Value =
        serde_json::from_str(&tool_calls[0].function.arguments).unwrap();
    assert_eq!(arguments, serde_json::json!({"location": "Beijing"}));
}

#[test]
fn test_aggregated_reasoning_is_balanced() {
    let mut translator = Translator::new(ThinkTagsMode::Think, "glm-4.5");
    let mut builder = ResponseBuilder::new();

    for data in [
        serde_json::json!({
            "phase": "thinking",
            "delta_content": "<details><summary>s</summary>\n> deep thought"
        }),
        serde_json::json!({"phase": "answer", "delta_content": "answer"}),
    ] {
        for event in translator.ingest(&upstream_chunk(data)) {
            builder.absorb(&event);
        }
    }
    for event in translator.finish() {
        builder.absorb(&event);
    }

    let response = builder.into_response("chatcmpl-test", 123, "glm-4.5");
    let reasoning = response.choices[0].message.reasoning_content.as_ref().unwrap();
    assert_eq!(
        reasoning.matches("<think>").count(),
        reasoning.matches("</think>").count()
    );
}
