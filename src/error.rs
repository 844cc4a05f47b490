use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

pub type AppResult<T> = Result<T, AppError>;

/// Application error type
///
/// Every failure that reaches the HTTP boundary is converted into one of these,
/// which renders as `{"error", "error_code", "status"}` JSON.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Authentication & Authorization Errors =====
    #[error("{0}")]
    Auth(#[from] AuthError),

    // ===== Routing & Backend Errors =====
    #[error("No service mounted for path {path}")]
    NotFound { path: String },

    #[error("Service `{service}` unavailable: {reason}")]
    BackendUnavailable {
        service: String,
        reason: String,
        /// Circuit breaker rejected the call without contacting the backend
        circuit_open: bool,
    },

    #[error("Service `{service}` did not respond within {timeout_secs}s")]
    BackendTimeout { service: String, timeout_secs: u64 },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    // ===== Auth Service Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Bad credentials")]
    BadCredentials,

    // ===== Internal Server Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::InactiveUser) => StatusCode::FORBIDDEN,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BackendUnavailable {
                circuit_open: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(_) | AppError::UserAlreadyExists | AppError::BadCredentials => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::MissingToken) => "Missing bearer token".to_string(),
            AppError::Auth(AuthError::ExpiredToken) => "Token expired".to_string(),
            AppError::Auth(AuthError::InactiveUser) => "Inactive user".to_string(),
            AppError::Auth(_) => "Bad token".to_string(),
            AppError::NotFound { .. } => "Not Found".to_string(),
            AppError::BackendUnavailable { service, .. } => {
                format!("Service '{}' is unavailable", service)
            }
            AppError::BackendTimeout { service, .. } => {
                format!("Service '{}' timed out", service)
            }
            AppError::PayloadTooLarge { limit } => {
                format!("Request body exceeds {} bytes", limit)
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::UserAlreadyExists => "REGISTER_USER_ALREADY_EXISTS".to_string(),
            AppError::BadCredentials => "LOGIN_BAD_CREDENTIALS".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(AuthError::MissingToken) => "MISSING_TOKEN",
            AppError::Auth(AuthError::InvalidToken(_)) => "INVALID_TOKEN",
            AppError::Auth(AuthError::ExpiredToken) => "EXPIRED_TOKEN",
            AppError::Auth(AuthError::InactiveUser) => "INACTIVE_USER",
            AppError::Auth(AuthError::MalformedClaim { .. }) => "MALFORMED_CLAIM",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            AppError::BackendTimeout { .. } => "BACKEND_TIMEOUT",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UserAlreadyExists => "REGISTER_USER_ALREADY_EXISTS",
            AppError::BadCredentials => "LOGIN_BAD_CREDENTIALS",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Authentication failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        // Gateway errors name the service; other server errors stay opaque
        let message = match &self {
            AppError::BackendUnavailable { .. } | AppError::BackendTimeout { .. } => {
                self.user_message()
            }
            _ if status.is_server_error() => "Internal server error".to_string(),
            _ => self.user_message(),
        };

        let body = json!({
            "error": message,
            "error_code": error_code,
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
