use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// The four outcomes a caller can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ErrorStatus {
    BadRequest,
    Unauthorized,
    Forbidden,
    InternalServerError,
}

impl ErrorStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorStatus::BadRequest => StatusCode::BAD_REQUEST,
            ErrorStatus::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorStatus::Forbidden => StatusCode::FORBIDDEN,
            ErrorStatus::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Status plus human-readable comment, carried unchanged from the point of
/// classification to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{status:?}: {comment}")]
pub struct AuthError {
    pub status: ErrorStatus,
    pub comment: String,
}

impl AuthError {
    pub fn new(status: ErrorStatus, comment: impl Into<String>) -> Self {
        Self {
            status,
            comment: comment.into(),
        }
    }

    pub fn bad_request(comment: impl Into<String>) -> Self {
        Self::new(ErrorStatus::BadRequest, comment)
    }

    pub fn unauthorized(comment: impl Into<String>) -> Self {
        Self::new(ErrorStatus::Unauthorized, comment)
    }

    pub fn forbidden(comment: impl Into<String>) -> Self {
        Self::new(ErrorStatus::Forbidden, comment)
    }

    pub fn internal(comment: impl Into<String>) -> Self {
        Self::new(ErrorStatus::InternalServerError, comment)
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// HTTP status code
    pub code: u16,
    pub comment: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            comment: self.comment,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(DbErr),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Conflict,
            _ => StoreError::Database(err),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TicketError {
    #[error("ticket not found")]
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum JwtError {
    #[error("expired jwt token")]
    Expired,
    #[error("invalid jwt token")]
    Invalid,
    #[error("failed to sign jwt: {0}")]
    Signing(String),
}

/// Failures raised by the grant engine.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_token: {0}")]
    InvalidToken(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error(transparent)]
    Hook(#[from] AuthError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("server_error: {0}")]
    Internal(String),
}

impl GrantError {
    /// OAuth2 error code for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            GrantError::InvalidRequest(_) => "invalid_request",
            GrantError::InvalidClient => "invalid_client",
            GrantError::InvalidGrant(_) | GrantError::Jwt(_) => "invalid_grant",
            GrantError::InvalidToken(_) => "invalid_token",
            GrantError::UnsupportedGrantType => "unsupported_grant_type",
            GrantError::UnsupportedResponseType => "unsupported_response_type",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::Hook(_) => "access_denied",
            GrantError::Store(_) | GrantError::Internal(_) => "server_error",
        }
    }

    /// Whether the failure originates on the server side rather than in the request.
    pub fn is_internal(&self) -> bool {
        match self {
            GrantError::Store(_) | GrantError::Internal(_) => true,
            GrantError::Jwt(JwtError::Signing(_)) => true,
            GrantError::Hook(err) => err.status == ErrorStatus::InternalServerError,
            _ => false,
        }
    }
}
