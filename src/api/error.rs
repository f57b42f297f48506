use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::EngineError;

/// HTTP-facing error type the insights handler maps `EngineError` onto.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("deadline exceeded: {0}")]
    Deadline(String),

    #[error("model unresponsive: {0}")]
    ModelUnresponsive(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Deadline(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ModelUnresponsive(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cancelled => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Deadline(_) => "Deadline",
            ApiError::ModelUnresponsive(_) => "ModelUnresponsive",
            ApiError::Cancelled => "Cancelled",
            ApiError::InternalError(_) => "InternalError",
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Deadline { iteration, max_iterations, elapsed_secs } => {
                ApiError::Deadline(format!(
                    "AI processing took too long at iteration {iteration}/{max_iterations} \
                     ({elapsed_secs:.1}s elapsed). Try simplifying your question."
                ))
            }
            EngineError::ModelUnresponsive { consecutive_empty } => ApiError::ModelUnresponsive(
                format!("the model returned {consecutive_empty} consecutive empty responses"),
            ),
            EngineError::Cancelled => ApiError::Cancelled,
            EngineError::Store(e) => ApiError::InternalError(e.to_string()),
            EngineError::Parse(message) => ApiError::InternalError(message),
            EngineError::Validation(flags) => {
                ApiError::BadRequest(format!("snapshot failed validation: {flags:?}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!(error = %self, "insights request failed"),
            StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                tracing::warn!(error = %self, "insights request degraded")
            }
            _ => tracing::debug!(error = %self, "insights request rejected"),
        }

        let body = ErrorResponse {
            error: error_type,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_maps_to_gateway_timeout() {
        let err = ApiError::from(EngineError::Deadline {
            iteration: 3,
            max_iterations: 10,
            elapsed_secs: 58.2,
        });
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_string().contains("iteration 3/10"));
    }

    #[test]
    fn cancelled_maps_to_conflict() {
        assert_eq!(ApiError::from(EngineError::Cancelled).status_code(), StatusCode::CONFLICT);
    }
}
