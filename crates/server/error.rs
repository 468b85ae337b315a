//! HTTP error mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use taskq_core::{AdmissionError, TaskqError};
use thiserror::Error;

/// Errors surfaced by the HTTP layer. Every variant maps to a stable `error`
/// code in the JSON body so callers can tell rejections apart.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("admin token required")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Admission(AdmissionError::MissingCredential) => "missing_api_key",
            ApiError::Admission(AdmissionError::InvalidCredential) => "invalid_api_key",
            ApiError::Admission(AdmissionError::ExpiredCredential) => "expired_api_key",
            ApiError::Admission(AdmissionError::RateLimited) => "rate_limited",
            ApiError::Admission(AdmissionError::Unavailable(_)) => "unavailable",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Validation(_) => "validation_error",
            ApiError::JobNotFound(_) => "job_not_found",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<TaskqError> for ApiError {
    fn from(err: TaskqError) -> Self {
        match err {
            TaskqError::Validation(msg) => ApiError::Validation(msg),
            TaskqError::Serialization(e) => ApiError::Validation(e.to_string()),
            TaskqError::JobNotFound(id) => ApiError::JobNotFound(id),
            TaskqError::Backend(_) | TaskqError::Timeout(_) => {
                tracing::error!(error = %err, "Store request failed");
                ApiError::Unavailable(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Admission(AdmissionError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Admission(AdmissionError::Unavailable(_)) | ApiError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Admission(_) | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        })
    }
}
