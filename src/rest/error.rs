//! API error types and responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::WaypointError;
use crate::store::StoreError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found
    NotFound(String),
    /// Validation error
    ValidationError(String),
    /// State conflict (illegal transition, duplicate record)
    Conflict(String),
    /// Record store unreachable
    Unavailable(String),
    /// Internal server error
    InternalError(String),
    /// Bad request
    BadRequest(String),
}

/// Error response body
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::DuplicateWaiting { .. } | StoreError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::Unavailable(_) => ApiError::Unavailable(err.to_string()),
            StoreError::Io(_) | StoreError::Serde(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<WaypointError> for ApiError {
    fn from(err: WaypointError) -> Self {
        match err {
            WaypointError::Store(inner) => inner.into(),
            WaypointError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            WaypointError::Validation(msg) => ApiError::ValidationError(msg),
            WaypointError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("JSON error: {}", err))
    }
}
