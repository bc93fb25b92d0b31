//! Per-request upstream feature flags.
//!
//! The upstream gates thinking, search and vision behavior on a `features`
//! map inside the request body. The flags derive from the client model id
//! and whether the client asked for a stream, then merge with the model
//! table's capabilities.

use chrono::{DateTime, Local};
use std::collections::HashMap;

use super::ModelMapping;

/// Feature flags carried in the upstream request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureConfig {
    pub enable_thinking: bool,
    pub web_search: bool,
    pub auto_web_search: bool,
    pub preview_mode: bool,
    pub vision: bool,
    pub image_generation: bool,
    pub mcp_servers: Vec<String>,
}

/// Derives the feature flags for one request.
///
/// Thinking rides the stream flag: aggregated requests never enable it,
/// and `nothinking` model variants force it off. Search variants light up
/// the three search flags plus an MCP server selection, which is dropped
/// again for non-streaming calls.
pub fn build_features(model_id: &str, streaming: bool, mapping: &ModelMapping) -> FeatureConfig {
    let id = model_id.trim().to_ascii_lowercase();

    let no_thinking = id.contains("nothinking") || id.contains("no-thinking");
    let mut enable_thinking = streaming && !no_thinking;
    if !mapping.thinking {
        enable_thinking = false;
    }

    let search = id.contains("search") || mapping.search;
    let mcp_servers = if search && streaming {
        if id.contains("advanced-search") {
            vec!["advanced-search".to_string()]
        } else {
            vec!["deep-web-search".to_string()]
        }
    } else {
        Vec::new()
    };

    let vision = mapping.vision
        || id.contains("glm-4.5v")
        || id.contains("vision")
        || id.contains("4v");

    FeatureConfig {
        enable_thinking,
        web_search: search,
        auto_web_search: search,
        preview_mode: search,
        vision,
        image_generation: id.contains("dall-e") || id.contains("image-gen"),
        mcp_servers,
    }
}

/// The template variables the upstream substitutes into its system prompt.
pub fn prompt_variables(now: DateTime<Local>) -> HashMap<String, String> {
    HashMap::from([
        ("{{USER_NAME}}".to_string(), "User".to_string()),
        ("{{USER_LOCATION}}".to_string(), "Unknown".to_string()),
        (
            "{{CURRENT_DATE}}".to_string(),
            now.format("%Y-%m-%d").to_string(),
        ),
        (
            "{{CURRENT_TIME}}".to_string(),
            now.format("%H:%M:%S").to_string(),
        ),
        (
            "{{CURRENT_DATETIME}}".to_string(),
            now.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
    ])
}
