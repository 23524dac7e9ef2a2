//! Error types for the Libris server

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error codes exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchRecord = 4,
    BadValue = 5,
    OutOfStock = 6,
    AlreadyCheckedOut = 7,
    AlreadyReturned = 8,
    RenewalLimitReached = 9,
    CheckoutLimitReached = 10,
    Busy = 11,
    ReconciliationRequired = 12,
    InvariantViolation = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No copies available: {0}")]
    OutOfStock(String),

    #[error("Already checked out: {0}")]
    AlreadyCheckedOut(String),

    #[error("Already returned: {0}")]
    AlreadyReturned(String),

    #[error("Renewal limit reached: {0}")]
    RenewalLimitExceeded(String),

    #[error("Checkout limit reached: {0}")]
    CheckoutLimitReached(String),

    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Inventory reconciliation required: {0}")]
    ReconciliationRequired(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchRecord, msg.clone())
            }
            AppError::OutOfStock(msg) => {
                (StatusCode::CONFLICT, ErrorCode::OutOfStock, msg.clone())
            }
            AppError::AlreadyCheckedOut(msg) => {
                (StatusCode::CONFLICT, ErrorCode::AlreadyCheckedOut, msg.clone())
            }
            AppError::AlreadyReturned(msg) => {
                (StatusCode::CONFLICT, ErrorCode::AlreadyReturned, msg.clone())
            }
            AppError::RenewalLimitExceeded(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::RenewalLimitReached, msg.clone())
            }
            AppError::CheckoutLimitReached(msg) => {
                (StatusCode::CONFLICT, ErrorCode::CheckoutLimitReached, msg.clone())
            }
            AppError::Busy(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Busy, msg.clone())
            }
            AppError::ReconciliationRequired(msg) => {
                (StatusCode::CONFLICT, ErrorCode::ReconciliationRequired, msg.clone())
            }
            AppError::InvariantViolation(msg) => {
                tracing::error!("Invariant violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::InvariantViolation,
                    "Internal consistency error".to_string(),
                )
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        if status == StatusCode::SERVICE_UNAVAILABLE {
            // Lock waits already include one internal retry; tell clients to back off.
            return (status, [(RETRY_AFTER, "1")], body).into_response();
        }

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
