//! Error types for the journal backend.

use thiserror::Error;

/// Result type alias using the journal's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for journal operations.
///
/// Variants group into four families that the HTTP layer maps to status codes:
/// validation (`InvalidInput`, `NoContent`), missing data (`NotFound`,
/// `EntryNotFound`), adapter failures (`Embedding`, `Inference`,
/// `Transcription`, `Storage`, `Timeout`) and lifecycle (`Initialization`).
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Journal entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Invalid input (rejected before any side effect)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Access denied (bad or expired blob URL signature)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation requires entry content but the entry is empty
    #[error("Entry has no content: {0}")]
    NoContent(String),

    /// A shared adapter handle was used before `init()` completed
    #[error("Not initialized: {0}")]
    Initialization(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Audio transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Blob storage or audio processing failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// An external call exceeded its deadline
    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of an external collaborator (model provider, blob
    /// store, media tooling), including timeouts.
    pub fn is_adapter_failure(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_)
                | Error::Inference(_)
                | Error::Transcription(_)
                | Error::Storage(_)
                | Error::Request(_)
                | Error::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Timeout {
                operation: e
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "http request".to_string()),
                secs: 0,
            };
        }
        Error::Request(e.to_string())
    }
}
