//! HTTP error mapping.
//!
//! Every domain error converts into [`ApiError`], which renders as
//! `{"error", "code", "details"}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::ledger::LedgerError;
use crate::reputation::ReputationError;
use crate::routes::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    /// A domain rule refused the request.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    fn rejected(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        ApiError::Rejected {
            status,
            code,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Rejected { status, .. } => *status,
            ApiError::DatabaseError(_) | ApiError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, details) = match self {
            ApiError::BadRequest(msg) => ("BAD_REQUEST", "Invalid request".to_string(), Some(msg)),
            ApiError::Unauthorized => ("UNAUTHORIZED", "Authentication required".to_string(), None),
            ApiError::Rejected { code, message, .. } => (code, message, None),
            ApiError::DatabaseError(err) => {
                // storage details stay in the log
                tracing::error!("Database error: {err}");
                ("DATABASE_ERROR", "Database error occurred".to_string(), None)
            }
            ApiError::InternalError => ("INTERNAL_ERROR", "An internal error occurred".to_string(), None),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(_) | StoreError::TransactionNotFound(_) | StoreError::ReviewNotFound(_) => {
                ApiError::rejected(StatusCode::NOT_FOUND, "NOT_FOUND", err)
            }
            StoreError::UserExists | StoreError::AccountExists(_) | StoreError::DuplicateReview => {
                ApiError::rejected(StatusCode::CONFLICT, "CONFLICT", err)
            }
            StoreError::Overdraft(_) | StoreError::InvalidUnfreeze(_) => {
                ApiError::rejected(StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_FUNDS", err)
            }
            StoreError::BalanceLimit(_) => {
                ApiError::rejected(StatusCode::UNPROCESSABLE_ENTITY, "BALANCE_LIMIT_EXCEEDED", err)
            }
            StoreError::IllegalTransition { .. } => ApiError::rejected(StatusCode::CONFLICT, "ILLEGAL_TRANSITION", err),
            StoreError::Corrupt(_) | StoreError::Database(_) => ApiError::DatabaseError(err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if let LedgerError::Store(store) = err {
            return store.into();
        }
        let status = match &err {
            LedgerError::InvalidAmount(_)
            | LedgerError::SelfTransferNotAllowed
            | LedgerError::CounterpartyRequired(_)
            | LedgerError::CurrencyMismatch { .. } => StatusCode::BAD_REQUEST,
            LedgerError::InsufficientFunds(_) | LedgerError::BalanceLimitExceeded(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::AccountInactive(_) => StatusCode::FORBIDDEN,
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::NotRefundable(_) => StatusCode::CONFLICT,
            LedgerError::SettlementFailed { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::BAD_GATEWAY {
            tracing::warn!("{err}");
        }
        ApiError::rejected(status, err.code(), err)
    }
}

impl From<ReputationError> for ApiError {
    fn from(err: ReputationError) -> Self {
        if let ReputationError::Store(store) = err {
            return store.into();
        }
        let status = match &err {
            ReputationError::RatingOutOfRange(_) | ReputationError::SelfReviewNotAllowed => StatusCode::BAD_REQUEST,
            ReputationError::DuplicateReview => StatusCode::CONFLICT,
            ReputationError::ReviewNotFound(_) => StatusCode::NOT_FOUND,
            ReputationError::NotReviewAuthor(_) | ReputationError::EditWindowExpired(_) => StatusCode::FORBIDDEN,
            ReputationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::rejected(status, err.code(), err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                ApiError::rejected(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err)
            }
            AuthError::UserExists => ApiError::rejected(StatusCode::CONFLICT, "USER_EXISTS", err),
            AuthError::WeakPassword(msg) => ApiError::BadRequest(msg.to_string()),
            AuthError::Hashing | AuthError::Token(_) => {
                tracing::error!("auth failure: {err}");
                ApiError::InternalError
            }
            AuthError::Store(store) => store.into(),
            AuthError::Ledger(ledger) => ledger.into(),
        }
    }
}
