//! Error types for the health subsystem.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors from the health subsystem.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("failed to read health state {}: {source}", path.display())]
    StateFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse health state {}: {source}", path.display())]
    StateFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read links {}: {source}", path.display())]
    LinkRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse links {}: {source}", path.display())]
    LinkParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not discover link files under {}: {message}", root.display())]
    Discovery { root: PathBuf, message: String },

    #[error("tls material {}: {message}", path.display())]
    TlsMaterial { path: PathBuf, message: String },

    #[error("tls configuration error: {0}")]
    TlsConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("listener failed: {0}")]
    Accept(#[source] std::io::Error),
}
