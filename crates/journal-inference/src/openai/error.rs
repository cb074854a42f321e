//! OpenAI-specific error handling.

use journal_core::Error;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

/// Which endpoint produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    Embedding,
    Completion,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert an OpenAI error to the journal Error.
///
/// Configuration problems (credentials, model name) map to `Error::Config`;
/// everything else is an adapter failure of the calling endpoint.
pub fn to_journal_error(code: OpenAIErrorCode, call: ApiCall, message: &str) -> Error {
    let detail = match code {
        OpenAIErrorCode::AuthenticationError => {
            return Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => {
            return Error::Config(format!("Model not found: {}", message))
        }
        OpenAIErrorCode::RateLimitExceeded => format!("Rate limit exceeded: {}", message),
        OpenAIErrorCode::ContextLengthExceeded => format!("Context too long: {}", message),
        OpenAIErrorCode::ServerError => format!("Server error: {}", message),
        OpenAIErrorCode::Unknown => message.to_string(),
    };
    match call {
        ApiCall::Embedding => Error::Embedding(detail),
        ApiCall::Completion => Error::Inference(detail),
    }
}
