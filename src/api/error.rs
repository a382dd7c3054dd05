//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::auth::ErrorEnvelope;
use crate::session::{RotationError, SessionError};

/// Successful response body: `{success: true, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// JSON body extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn store_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn store_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::unavailable(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InvalidCredentials,
    /// Refresh token expired or not a valid refresh token. The client may log in again.
    InvalidRefreshToken,
    /// Refresh token reused or invalidated by logout-all. The client must log in again.
    RefreshRejected,
    NotFound(String),
    ServiceUnavailable,
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn unavailable(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::ServiceUnavailable
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".into(),
            ),
            ApiError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_REFRESH_TOKEN",
                "Invalid or expired refresh token".into(),
            ),
            ApiError::RefreshRejected => (
                StatusCode::UNAUTHORIZED,
                "REFRESH_REJECTED",
                "Refresh token rejected, please log in again".into(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service temporarily unavailable".into(),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    pub fn error_code(&self) -> &'static str {
        self.parts().1
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        ErrorEnvelope::new(message, code).into_response_with(status)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "Rejected request body: {}", rejection.body_text());
        ApiError::bad_request("Invalid request body")
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials => ApiError::InvalidCredentials,
            SessionError::Store(e) => ApiError::unavailable("Revocation store error", e),
            SessionError::Resolver(e) => ApiError::unavailable("Identity lookup error", e),
            SessionError::Issue(e) => {
                error!("Failed to issue token: {}", e);
                ApiError::internal("Failed to generate token")
            }
        }
    }
}

impl From<RotationError> for ApiError {
    fn from(e: RotationError) -> Self {
        match e {
            RotationError::StoreUnavailable(e) => ApiError::unavailable("Revocation store error", e),
            RotationError::ResolverUnavailable(e) => {
                ApiError::unavailable("Identity lookup error", e)
            }
            RotationError::Issue(e) => {
                error!("Failed to issue token: {}", e);
                ApiError::internal("Failed to generate token")
            }
            e if e.requires_login() => ApiError::RefreshRejected,
            _ => ApiError::InvalidRefreshToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::StoreError;

    #[test]
    fn test_rotation_error_mapping() {
        assert_eq!(
            ApiError::from(RotationError::Reused).error_code(),
            "REFRESH_REJECTED"
        );
        assert_eq!(
            ApiError::from(RotationError::Invalidated).error_code(),
            "REFRESH_REJECTED"
        );
        assert_eq!(
            ApiError::from(RotationError::Expired).error_code(),
            "INVALID_REFRESH_TOKEN"
        );
        assert_eq!(
            ApiError::from(RotationError::Invalid).error_code(),
            "INVALID_REFRESH_TOKEN"
        );
        let unavailable = ApiError::from(RotationError::StoreUnavailable(StoreError::Timeout));
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_failure_is_503() {
        let result: Result<(), StoreError> = Err(StoreError::Timeout);
        let err = result.store_err("Failed to read store").unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
