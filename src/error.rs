//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    OutOfStock = 6,
    LoanLimitExceeded = 7,
    RenewalLimitReached = 8,
    AlreadyOverdue = 9,
    InvalidState = 10,
    NotCurrentlyBorrowed = 11,
    CopyInUse = 12,
    Duplicate = 13,
    UnknownBarcode = 14,
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

    #[error("Unknown barcode: {0}")]
    UnknownBarcode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Loan limit exceeded ({open}/{limit})")]
    LoanLimitExceeded { open: i64, limit: i64 },

    #[error("Renewal limit reached ({0})")]
    RenewalLimitReached(i32),

    #[error("Loan is already overdue")]
    AlreadyOverdue,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Copy {0} is not currently borrowed")]
    NotCurrentlyBorrowed(String),

    #[error("Copy in use: {0}")]
    CopyInUse(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: String,
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Store or internal failure, as opposed to a rejected request
    pub fn is_server_error(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Internal(_))
    }

    /// HTTP status and stable code for this error
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData),
            AppError::UnknownBarcode(_) => (StatusCode::NOT_FOUND, ErrorCode::UnknownBarcode),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::OutOfStock(_) => (StatusCode::BAD_REQUEST, ErrorCode::OutOfStock),
            AppError::LoanLimitExceeded { .. } => {
                (StatusCode::BAD_REQUEST, ErrorCode::LoanLimitExceeded)
            }
            AppError::RenewalLimitReached(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::RenewalLimitReached)
            }
            AppError::AlreadyOverdue => (StatusCode::BAD_REQUEST, ErrorCode::AlreadyOverdue),
            AppError::InvalidState(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidState),
            AppError::NotCurrentlyBorrowed(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::NotCurrentlyBorrowed)
            }
            AppError::CopyInUse(_) => (StatusCode::BAD_REQUEST, ErrorCode::CopyInUse),
            AppError::DuplicateKey(_) => (StatusCode::BAD_REQUEST, ErrorCode::Duplicate),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::OutOfStock(msg)
            | AppError::InvalidState(msg)
            | AppError::CopyInUse(msg)
            | AppError::DuplicateKey(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            status: "error".to_string(),
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(e.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
