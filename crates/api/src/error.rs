//! HTTP error payload.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::EngineError;
use serde::Serialize;

/// `{ "error": "..." }` with the matching status code.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::TemplateNotFound(_) | EngineError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) | EngineError::DuplicateTemplate(_) => StatusCode::BAD_REQUEST,
            EngineError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            error: err.to_string(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
