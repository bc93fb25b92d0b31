//! Fingerprint store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading the fingerprint database.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The database file could not be read.
    #[error("failed to read fingerprint database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database file is not valid JSON of the expected shape.
    #[error("failed to parse fingerprint database {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The database contains no fingerprints.
    #[error("fingerprint database contains no fingerprints")]
    Empty,
}
