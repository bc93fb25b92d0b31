//! Stream-processing error types.

use thiserror::Error;

use crate::constants::MAX_AGGREGATE_BYTES;

/// Errors while folding a stream into one response.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The raw upstream stream outgrew the aggregation cap.
    #[error("aggregated response exceeded {MAX_AGGREGATE_BYTES} bytes")]
    ResponseTooLarge,

    /// The upstream connection failed before the stream completed.
    #[error("upstream stream failed during aggregation: {0}")]
    Transport(#[from] reqwest::Error),
}
