//! Textual rewriting of the upstream's reasoning markup.
//!
//! The upstream wraps thinking output in `<details>`/`<summary>` HTML and
//! quotes it with `> ` prefixes. Clients expect `<think>` tags (or nothing).
//! This is deliberate text substitution, not an HTML parser; the exact
//! substitution set per mode is part of the gateway's contract.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::ThinkTagsMode;

static SUMMARY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary>.*?</summary>").expect("static regex"));

static DETAILS_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<details[^>]*>").expect("static regex"));

/// Rewrites one thinking-phase delta according to the configured mode.
pub fn rewrite_thinking(content: &str, mode: ThinkTagsMode) -> String {
    // Cheap cleanups apply in every mode.
    let text = content
        .replace("</thinking>", "")
        .replace("<Full>", "")
        .replace("</Full>", "");

    if mode == ThinkTagsMode::Raw {
        return text.replace("\n> ", "\n");
    }

    let text = SUMMARY_SPAN.replace_all(&text, "");

    let text = match mode {
        ThinkTagsMode::Think => DETAILS_OPEN
            .replace_all(&text, "<think>")
            .replace("</details>", "</think>"),
        ThinkTagsMode::Strip => DETAILS_OPEN.replace_all(&text, "").replace("</details>", ""),
        ThinkTagsMode::Raw => unreachable!("raw mode returned above"),
    };

    let text = text.replace("\n> ", "\n");
    match text.strip_prefix("> ") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}
