//! HTTP error mapping.
//!
//! Every failure leaves the API as `{"error": <summary>, "details": <message>}`.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use journal_core::Error;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    ServiceUnavailable(String),
    Timeout(String),
    /// A model provider, blob store or media tool failed.
    Adapter(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Adapter(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Invalid request",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "Not found",
            ApiError::ServiceUnavailable(_) => "Service unavailable",
            ApiError::Timeout(_) => "Request timed out",
            ApiError::Adapter(_) => "Processing failed",
            ApiError::Internal(_) => "Internal server error",
        }
    }

    fn details(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Timeout(msg)
            | ApiError::Adapter(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidInput(_) | Error::NoContent(_) => ApiError::BadRequest(message),
            Error::Forbidden(_) => ApiError::Forbidden(message),
            Error::NotFound(_) | Error::EntryNotFound(_) => ApiError::NotFound(message),
            Error::Initialization(_) => ApiError::ServiceUnavailable(message),
            Error::Timeout { .. } => ApiError::Timeout(message),
            ref e if e.is_adapter_failure() => ApiError::Adapter(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Multipart error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                subsystem = "api",
                status = status.as_u16(),
                error = %self.details(),
                "Request failed"
            );
        } else {
            warn!(
                subsystem = "api",
                status = status.as_u16(),
                error = %self.details(),
                "Request rejected"
            );
        }

        let body = Json(serde_json::json!({
            "error": self.summary(),
            "details": self.details(),
        }));

        (status, body).into_response()
    }
}
