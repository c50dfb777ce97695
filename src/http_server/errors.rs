//! # HTTP Errors
//!
//! Maps store and presence failures onto status codes. Server-side failures
//! are logged in full and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::dataset::VersionToken;
use crate::observability::{log_event_with_fields, Event};
use crate::presence::PresenceError;
use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Malformed JSON, non-object payload, empty required field
    #[error("{0}")]
    InvalidInput(String),

    #[error("If-Match header with the current version is required")]
    PreconditionMissing,

    #[error("Version conflict: the dataset was changed by someone else")]
    VersionConflict { current_version: VersionToken },

    #[error("{0}")]
    NotFound(String),

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Detail is logged, never returned
    #[error("Storage unavailable")]
    StorageUnavailable(String),

    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PreconditionMissing => StatusCode::PRECONDITION_REQUIRED,
            ApiError::VersionConflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            ApiError::StorageUnavailable(detail) | ApiError::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        let current_version = match err {
            ApiError::VersionConflict { current_version } => Some(current_version.to_string()),
            _ => None,
        };
        Self {
            error: err.to_string(),
            code: err.status_code().as_u16(),
            current_version,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(detail) = self.detail() {
            log_event_with_fields(
                Event::RequestFailed,
                &[("detail", detail), ("error", &self.to_string())],
            );
        }
        let status = self.status_code();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            StoreError::PreconditionMissing => ApiError::PreconditionMissing,
            StoreError::VersionConflict { current } => ApiError::VersionConflict {
                current_version: current,
            },
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::StorageUnavailable(detail) => ApiError::StorageUnavailable(detail),
        }
    }
}

impl From<PresenceError> for ApiError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::InvalidSessionId => ApiError::InvalidInput(err.to_string()),
            PresenceError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}
