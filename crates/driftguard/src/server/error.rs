//! Query surface error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Drift record not found: {resource_id}")]
    RecordNotFound { resource_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Error response structure for API responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::RecordNotFound { .. } => "record_not_found",
            ApiError::Database(_) => "database_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Database(e) => {
                log::error!("API database error: {}", e);
                "A database error occurred".to_string()
            }
            _ => self.to_string(),
        };
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}
