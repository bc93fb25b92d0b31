//! # zgate
//!
//! OpenAI-compatible chat-completions gateway for the Z.ai GLM upstream.
//!
//! Clients speak the OpenAI REST dialect; zgate signs and translates each
//! request into the upstream's internal shape, streams the upstream's SSE
//! back, and re-emits it as OpenAI chunks (or one aggregated body).
//!
//! ```text
//! Client ──► gateway ──► adapter/model ──► auth ──► upstream ──► sse ──► Client
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Environment-backed configuration
//! - [`auth`] - Upstream signatures and token caching
//! - [`fingerprint`] - Sticky browser fingerprints per session
//! - [`model`] - Model id mapping and feature flags
//! - [`protocol`] - Wire types for all three protocol surfaces
//! - [`adapter`] - Client message translation
//! - [`upstream`] - Signed upstream calls with retry
//! - [`sse`] - Stream translation, tool reconstruction, aggregation
//! - [`gateway`] - Axum routing and request handling
//! - [`stats`] - Asynchronous request metrics

pub mod adapter;
pub mod auth;
pub mod config;
pub mod constants;
pub mod fingerprint;
pub mod gateway;
pub mod model;
pub mod protocol;
pub mod sse;
pub mod stats;
pub mod upstream;

pub use adapter::{AdaptedConversation, MediaRef, adapt_messages, normalize_tool_choice};
pub use auth::{AuthError, JwtClaims, TokenCache, decode_jwt, guest_user_id, sign};
pub use config::{Config, ConfigError, ThinkTagsMode};
pub use fingerprint::{Fingerprint, FingerprintError, FingerprintStore, Scenario};
pub use gateway::{ApiError, AppState, ClientMeta, create_router_with_state};
pub use model::{MODEL_CARDS, ModelCard, ModelMapping, build_features, prompt_variables, resolve};
pub use protocol::{
    ChatCompletionRequest, ChunkResponse, CompletionResponse, Phase, UpstreamChunk,
    UpstreamRequest, Usage, validate,
};
pub use sse::{
    AggregateError, ResponseBuilder, SseReader, StreamEvent, ToolAssembler, Translator,
    aggregate_stream, pump,
};
pub use stats::{RequestEvent, StatsCollector, StatsSnapshot};
pub use upstream::{UpstreamClient, UpstreamError};
