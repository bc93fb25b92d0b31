//! Client model id → upstream model id mapping.

pub mod features;


pub use features::{FeatureConfig, build_features, prompt_variables};

/// Upstream identity and capabilities for one client-facing model id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMapping {
    pub upstream_id: String,
    pub thinking: bool,
    pub tools: bool,
    pub vision: bool,
    pub search: bool,
}

/// A model advertised on `GET /v1/models`.
#[derive(Debug, Clone, Copy)]
pub struct ModelCard {
    pub id: &'static str,
    pub created: i64,
}

/// Client-facing catalog. `created` values are fixed release epochs so
/// restarts do not reshuffle client caches.
pub const MODEL_CARDS: &[ModelCard] = &[
    ModelCard { id: "glm-4.5", created: 1_753_574_400 },
    ModelCard { id: "glm-4.5-air", created: 1_753_574_400 },
    ModelCard { id: "glm-4.5v", created: 1_753_574_400 },
    ModelCard { id: "glm-4.5-search", created: 1_753_574_400 },
    ModelCard { id: "glm-4.6", created: 1_759_190_400 },
    ModelCard { id: "glm-4.6-nothinking", created: 1_759_190_400 },
    ModelCard { id: "glm-4.6-advanced-search", created: 1_759_190_400 },
];

/// Maps a client model id onto the upstream id and its capabilities.
///
/// Matching runs on the trimmed, lowercased id: exact rows first, then
/// substring rows, then passthrough. Two substring layers apply on top of
/// whatever row matched: `vision`/`4v` forces vision, and
/// `nothinking`/`no-thinking`/`air` forces thinking off.
pub fn resolve(client_id: &str) -> ModelMapping {
    let normalized = client_id.trim().to_ascii_lowercase();

    let mut mapping = match normalized.as_str() {
        "glm-4.6" => ModelMapping {
            upstream_id: "GLM-4-6-API-V1".to_string(),
            thinking: true,
            tools: true,
            vision: false,
            search: false,
        },
        "glm-4.5" => ModelMapping {
            upstream_id: "0727-360B-API".to_string(),
            thinking: true,
            tools: true,
            vision: false,
            search: false,
        },
        _ if normalized.contains("glm-4.5-search") => ModelMapping {
            upstream_id: "0727-360B-API".to_string(),
            thinking: true,
            tools: true,
            vision: false,
            search: true,
        },
        _ if normalized.contains("glm-4.5-air") => ModelMapping {
            upstream_id: "0727-106B-API".to_string(),
            thinking: false,
            tools: false,
            vision: false,
            search: false,
        },
        _ if normalized.contains("glm-4.5v") => ModelMapping {
            upstream_id: "glm-4.5v".to_string(),
            thinking: false,
            tools: false,
            vision: true,
            search: false,
        },
        _ => ModelMapping {
            upstream_id: client_id.trim().to_string(),
            thinking: true,
            tools: true,
            vision: false,
            search: false,
        },
    };

    if normalized.contains("vision") || normalized.contains("4v") {
        mapping.vision = true;
    }
    if normalized.contains("nothinking")
        || normalized.contains("no-thinking")
        || normalized.contains("air")
    {
        mapping.thinking = false;
    }

    mapping
}
