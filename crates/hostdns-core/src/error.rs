//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}
