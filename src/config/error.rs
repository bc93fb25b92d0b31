//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port value is outside valid range (1-65535).
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort { value: String },

    /// Port string could not be parsed as a number.
    #[error("failed to parse port '{value}': {source}")]
    PortParseError {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Bind address string could not be parsed.
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// `API_KEY` must be set to a non-empty value.
    #[error("API_KEY must be set to a non-empty value")]
    MissingApiKey,

    /// Anonymous tokens are disabled but no fixed upstream token is set.
    #[error("UPSTREAM_TOKEN is required when ANON_TOKEN_ENABLED=false")]
    MissingUpstreamToken,

    /// `THINK_TAGS_MODE` is not one of `strip`, `think`, `raw`.
    #[error("invalid THINK_TAGS_MODE '{value}': expected strip, think or raw")]
    InvalidThinkTagsMode { value: String },

    /// `MAX_CONCURRENT_REQUESTS` is outside 1-1000.
    #[error("invalid MAX_CONCURRENT_REQUESTS '{value}': must be between 1 and 1000")]
    InvalidConcurrencyLimit { value: String },
}
