//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{copy::CopyId, member::MemberId, member::MemberStatus, transaction::TransactionId};

/// Numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    StorageFailure = 3,
    NoSuchMember = 4,
    NoSuchCopy = 5,
    CopyNotAvailable = 7,
    MaxBorrowsReached = 11,
    MemberNotEligible = 12,
    BadValue = 18,
    NoSuchTransaction = 20,
    AlreadyReturned = 22,
    InvalidTransition = 23,
    NoOpenLoan = 24,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Copy {0} not found")]
    CopyNotFound(CopyId),

    #[error("Copy {0} is not available")]
    CopyUnavailable(CopyId),

    #[error("Member {0} not found")]
    MemberNotFound(MemberId),

    #[error("Member {member_id} is not eligible to borrow (status: {status})")]
    MemberIneligible {
        member_id: MemberId,
        status: MemberStatus,
    },

    #[error("Member {member_id} has reached the maximum number of loans ({open}/{limit})")]
    MemberLimitExceeded {
        member_id: MemberId,
        open: i64,
        limit: i64,
    },

    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("Transaction {0} has already been returned")]
    TransactionAlreadyReturned(TransactionId),

    #[error("No open loan for copy {0}")]
    NoOpenTransaction(CopyId),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an `InvalidStateTransition` from any two displayable states
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        AppError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Status and code the API layer answers with
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::CopyNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchCopy),
            AppError::CopyUnavailable(_) => (StatusCode::CONFLICT, ErrorCode::CopyNotAvailable),
            AppError::MemberNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchMember),
            AppError::MemberIneligible { .. } => (StatusCode::FORBIDDEN, ErrorCode::MemberNotEligible),
            AppError::MemberLimitExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MaxBorrowsReached)
            }
            AppError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchTransaction),
            AppError::TransactionAlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
            AppError::NoOpenTransaction(_) => (StatusCode::NOT_FOUND, ErrorCode::NoOpenLoan),
            AppError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, ErrorCode::InvalidTransition)
            }
            AppError::StorageUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StorageFailure)
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
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

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::StorageUnavailable(e) => {
                tracing::error!("Storage error: {:?}", e);
                "Storage unavailable".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_errors_map_to_distinct_responses() {
        let errors = [
            AppError::CopyNotFound(1),
            AppError::CopyUnavailable(1),
            AppError::MemberNotFound(1),
            AppError::MemberIneligible {
                member_id: 1,
                status: MemberStatus::Suspended,
            },
            AppError::MemberLimitExceeded {
                member_id: 1,
                open: 3,
                limit: 3,
            },
            AppError::TransactionNotFound(1),
            AppError::TransactionAlreadyReturned(1),
            AppError::invalid_transition("returned", "overdue"),
        ];

        let mut seen = std::collections::HashSet::new();
        for err in &errors {
            let (status, code) = err.status_and_code();
            assert!(seen.insert((status.as_u16(), code as u32)), "duplicate mapping for {err}");
        }
    }

    #[test]
    fn test_limit_message() {
        let err = AppError::MemberLimitExceeded {
            member_id: 7,
            open: 3,
            limit: 3,
        };
        assert_eq!(
            err.to_string(),
            "Member 7 has reached the maximum number of loans (3/3)"
        );
    }
}
