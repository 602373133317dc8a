//! Error types for uplift-fetch.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Network-level failure. `transient` marks retry candidates
    /// (timeouts, refused connections) as opposed to permanent failures
    /// such as HTTP error statuses.
    #[error("network error fetching {url}: {detail}")]
    Network {
        url: String,
        detail: String,
        transient: bool,
    },

    /// TLS handshake rejected the server certificate. Surfaced separately
    /// so operators are steered toward trust configuration rather than
    /// connectivity debugging.
    #[error("server certificate for {url} is not trusted by this process: {detail}")]
    Certificate { url: String, detail: String },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("length mismatch for {url}: server declared {declared} bytes, received {received}")]
    LengthMismatch {
        url: String,
        declared: u64,
        received: u64,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { transient: true, .. })
    }
}
