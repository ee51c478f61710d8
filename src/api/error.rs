//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid bearer token
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Request conflicts with the resource's current state
    #[error("{0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (feature disabled or dependency down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Invalid(msg) => ApiError::Validation(msg),
            StoreError::Forbidden(msg) => ApiError::Forbidden(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Issue(msg) => ApiError::Internal(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            status = status.as_u16(),
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_statuses() {
        let cases = [
            (StoreError::not_found("x"), StatusCode::NOT_FOUND),
            (StoreError::invalid("x"), StatusCode::BAD_REQUEST),
            (StoreError::forbidden("x"), StatusCode::FORBIDDEN),
            (StoreError::conflict("x"), StatusCode::CONFLICT),
            (StoreError::Lock("poisoned".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_and_code().0, status);
        }
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        let err = ApiError::from(AuthError::MissingToken);
        assert_eq!(err.status_and_code().0, StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Missing bearer token");
    }

    #[test]
    fn test_domain_message_is_preserved() {
        let err = ApiError::from(StoreError::invalid("Rejection reason is required"));
        assert_eq!(err.to_string(), "Rejection reason is required");
    }
}
