//! Error types for the application

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or unparseable request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Token absent, mismatched, or already used. One message for every
    /// cause so the page leaks nothing about which it was.
    #[error("This approval link is no longer valid")]
    InvalidToken,

    /// Acting identity does not match the link's approver.
    #[error("Not authorized to act on this approval")]
    Unauthorized,

    /// A configured column header is missing from the sheet.
    #[error("Header not found: {0}")]
    HeaderNotFound(String),

    #[error("Row {0} not found")]
    RowNotFound(i64),

    /// The document lock could not be acquired within the timeout.
    #[error("Timed out waiting for the document lock")]
    LockTimeout,

    #[error("Mail delivery error: {0}")]
    Mail(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::InvalidToken => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::HeaderNotFound(h) => {
                tracing::error!("Sheet schema drift, header not found: {}", h);
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error".to_string())
            }
            AppError::RowNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::LockTimeout => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Mail(e) => {
                tracing::error!("Mail delivery error: {}", e);
                (StatusCode::BAD_GATEWAY, "Mail delivery error".to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
