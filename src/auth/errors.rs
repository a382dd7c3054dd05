//! Denial responses produced at the authentication boundary.
//!
//! These are written straight to the response body with `serde_json`, since
//! they are produced by middleware before any handler runs.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::clock::epoch_millis;

/// Uniform error body: `{success, message, errorCode, timestamp}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub error_code: &'static str,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, error_code: &'static str) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
            timestamp: epoch_millis(),
        }
    }

    /// Serialize into a JSON response with the given status.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        let body = match serde_json::to_vec(&self) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize error envelope");
                return status.into_response();
            }
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Why the authorization gate turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No handler exists for the method and path.
    NotFound,
    /// A handler exists but the caller has no principal.
    Unauthenticated,
    /// The caller has a principal without the required role.
    Forbidden,
}

impl Denial {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Denial::NotFound => StatusCode::NOT_FOUND,
            Denial::Unauthenticated => StatusCode::UNAUTHORIZED,
            Denial::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Denial::NotFound => "ENDPOINT_NOT_FOUND",
            Denial::Unauthenticated => "UNAUTHORIZED",
            Denial::Forbidden => "ACCESS_DENIED",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Denial::NotFound => "Endpoint not found",
            Denial::Unauthenticated => "Not authenticated",
            Denial::Forbidden => "Access denied",
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        ErrorEnvelope::new(self.message(), self.error_code()).into_response_with(self.status_code())
    }
}
