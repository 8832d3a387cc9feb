//! Error types for the lending server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::repository::kv::KvError;

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StoreFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    LoanAlreadyApproved = 6,
    LoanNotApproved = 7,
    BookNotAvailable = 8,
    NothingOnLoan = 9,
    WriteConflict = 10,
    StoreUnavailable = 11,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Loan {0} has already been approved")]
    AlreadyApproved(i64),

    #[error("Loan {0} has not been approved yet")]
    NotYetApproved(i64),

    #[error("Book {0} has no copy available for loan")]
    CapacityExceeded(i64),

    #[error("Book {0} has no copy on loan to take back")]
    InvalidReturn(i64),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            KvError::Backend(msg) => AppError::StoreError(msg),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData),
            AppError::AlreadyApproved(_) => (StatusCode::CONFLICT, ErrorCode::LoanAlreadyApproved),
            AppError::NotYetApproved(_) => (StatusCode::CONFLICT, ErrorCode::LoanNotApproved),
            AppError::CapacityExceeded(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BookNotAvailable)
            }
            AppError::InvalidReturn(_) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::NothingOnLoan),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::WriteConflict),
            AppError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
            }
            AppError::StoreError(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StoreFailure),
            AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StoreFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::StoreError(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                tracing::error!("{}", self);
                "Internal server error".to_string()
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                "Storage is temporarily unavailable".to_string()
            }
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::InvalidRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
