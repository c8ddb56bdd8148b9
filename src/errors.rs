use crate::gateway::errors::{ErrorKind, ObjectLayerError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors on their way out as HTTP responses.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    /// S3-style error code (`NoSuchKey`, `AccessDenied`, ...).
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidArgument", msg)
    }

    /// Shortcut for 416 Range Not Satisfiable
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::RANGE_NOT_SATISFIABLE, "InvalidRange", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ObjectLayerError> for AppError {
    fn from(err: ObjectLayerError) -> Self {
        let (status, code) = match (&err, err.kind()) {
            (ObjectLayerError::BucketNotFound { .. }, _) => (StatusCode::NOT_FOUND, "NoSuchBucket"),
            (_, ErrorKind::ResourceNotFound) => (StatusCode::NOT_FOUND, "NoSuchKey"),
            (_, ErrorKind::AccessDenied) => (StatusCode::FORBIDDEN, "AccessDenied"),
            (ObjectLayerError::BucketNameInvalid { .. }, _) => {
                (StatusCode::BAD_REQUEST, "InvalidBucketName")
            }
            (_, ErrorKind::InvalidName) => (StatusCode::BAD_REQUEST, "XMinioInvalidObjectName"),
            (_, ErrorKind::BackendUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable")
            }
            (_, ErrorKind::TranslationFailure) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
            }
        };

        if status.is_server_error() {
            tracing::warn!("anonymous request failed: {}", err);
        }

        AppError::new(status, code, err.to_string())
    }
}
