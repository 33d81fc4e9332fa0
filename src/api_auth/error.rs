//! Authentication error types.
//!
//! Provides structured error codes for request verification failures.
//! Every failure is terminal for the current request.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Authentication error codes (4001-4006).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 4001: Missing or malformed header or parameter
    InvalidInput = 4001,
    /// 4002: Timestamp outside the freshness window
    Expired = 4002,
    /// 4003: Access key not registered or disabled
    UnknownCredential = 4003,
    /// 4004: Computed signature differs from the supplied one
    SignatureMismatch = 4004,
    /// 4005: Credential lacks the required permission
    PermissionDenied = 4005,
    /// 4006: Credential store could not be read
    InternalStoreFailure = 4006,
}

impl AuthErrorCode {
    /// Get error code as i32.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get error name string.
    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::Expired => "EXPIRED",
            Self::UnknownCredential => "UNKNOWN_CREDENTIAL",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InternalStoreFailure => "INTERNAL_STORE_FAILURE",
        }
    }

    /// Get HTTP status code.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InternalStoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::InternalStoreFailure)
    }
}

/// Authentication error with message and client diagnostics.
///
/// `value` holds the offending input or the locally computed signature.
/// It must never hold a secret key.
#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
    pub value: Option<String>,
    pub suggestions: Vec<String>,
}

impl AuthError {
    /// Create a new auth error.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            value: None,
            suggestions: Vec::new(),
        }
    }

    /// Create error with default message.
    pub fn from_code(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::InvalidInput => "Invalid request input",
            AuthErrorCode::Expired => "Request timestamp is outside the accepted window",
            AuthErrorCode::UnknownCredential => "Unknown or disabled access key",
            AuthErrorCode::SignatureMismatch => {
                "Client signature does not match the server computed signature"
            }
            AuthErrorCode::PermissionDenied => "Insufficient permissions for this operation",
            AuthErrorCode::InternalStoreFailure => "Credential store unavailable",
        };
        Self::new(code, message)
    }

    /// Shorthand for [`AuthErrorCode::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidInput, message)
    }

    /// Attach the offending value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Attach a hint on how the client can fix the request.
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code.name(), self.code.code(), self.message)
    }
}

impl std::error::Error for AuthError {}

/// JSON response body for auth errors.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub code: i32,
    pub error: &'static str,
    pub message: String,
    /// Only store outages are worth retrying unchanged
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<AuthError> for AuthErrorResponse {
    fn from(err: AuthError) -> Self {
        Self {
            code: err.code.code(),
            error: err.code.name(),
            message: err.message,
            retryable: err.code.is_retryable(),
            value: err.value,
            suggestions: err.suggestions,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        (status, Json(AuthErrorResponse::from(self))).into_response()
    }
}
