//! Upstream call error types.

use thiserror::Error;

use crate::auth::AuthError;

/// Errors surfaced by the upstream client after retries are spent.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Token acquisition failed before the call could be made.
    #[error("upstream authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A non-retryable transport failure, or the last of the retryable ones.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The call deadline expired.
    #[error("upstream call timed out")]
    Timeout,

    /// A non-retryable HTTP status, or the last retryable one.
    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl UpstreamError {
    /// Whether this error should surface to clients as a gateway timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
