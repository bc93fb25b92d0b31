//! Wire types for the three protocol surfaces the gateway speaks.
//!
//! - [`request`]: the OpenAI-dialect requests clients send us, plus
//!   validation of the business rules on them.
//! - [`upstream`]: the request body and SSE chunk shapes of the upstream.
//! - [`openai`]: the OpenAI-shaped chunks and completions we emit.

pub mod openai;
pub mod request;
pub mod upstream;


pub use openai::{
    ChunkChoice, ChunkResponse, CompletionChoice, CompletionResponse, Delta, FunctionDelta,
    FunctionOut, ResponseMessage, ToolCallDelta, ToolCallOut,
};
pub use request::{
    ChatCompletionRequest, ChatMessage, ContentPart, FunctionDefinition, MediaUrl, MessageContent,
    NamedToolChoice, ToolChoice, ToolDefinition, ValidationError, validate,
};
pub use upstream::{
    BackgroundTasks, Phase, UpstreamChunk, UpstreamChunkData, UpstreamErrorBody, UpstreamFeatures,
    UpstreamMessage, UpstreamRequest, Usage,
};
