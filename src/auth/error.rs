//! Authentication error types.

use thiserror::Error;

/// Errors from JWT decoding and upstream token acquisition.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The bearer token is not a decodable JWT.
    #[error("invalid JWT: {reason}")]
    InvalidJwt { reason: String },

    /// The anonymous-token endpoint answered with a non-success status.
    #[error("anonymous token fetch failed with status {status}")]
    TokenFetchStatus { status: u16 },

    /// The anonymous-token endpoint was unreachable or returned a bad body.
    #[error("anonymous token fetch failed: {0}")]
    TokenFetchTransport(#[from] reqwest::Error),

    /// Anonymous tokens are disabled and no fixed token is configured.
    #[error("no upstream token source configured")]
    NoTokenConfigured,
}
