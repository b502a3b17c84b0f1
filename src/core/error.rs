//! # Error Handling Module
//!
//! Every failure the gateway can produce is a variant of [`GatewayError`]. Each variant
//! maps to a fixed HTTP status code and a stable, user-facing message, and the
//! `IntoResponse` implementation renders it as `{"detail": "<message>"}` so callers see
//! the same error shape no matter which stage of the pipeline rejected them.
//!
//! The `#[error("...")]` attribute from `thiserror` gives us `Display`; that text is
//! exactly what goes into the `detail` field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the authenticating gateway
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Protected request arrived without an `Authorization` header
    #[error("Authorization header missing")]
    MissingAuthHeader,

    /// `Authorization` header is not `Bearer <token>`
    #[error("Invalid authorization header format. Expected: Bearer <token>")]
    MalformedAuthHeader,

    /// No token verifier could be built at startup
    #[error("Firebase Admin SDK not initialized")]
    VerifierUnavailable,

    #[error("Firebase token expired")]
    TokenExpired,

    /// Bad signature, malformed, revoked or otherwise rejected token
    #[error("Invalid Firebase token")]
    TokenInvalid,

    /// Verification failed for a reason that is not about the token itself
    #[error("Token verification failed: {cause}")]
    TokenVerificationOther { cause: String },

    /// Verified claims carry no subject identifier
    #[error("Firebase token missing UID")]
    MissingSubjectClaim,

    /// The downstream call could not be completed (refused, timed out, DNS, ...)
    #[error("Failed to forward request to Composite Service: {cause}")]
    DownstreamTransportFailure { cause: String },

    /// Configuration-related errors (invalid config, unreadable files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("JSON error: {message}")]
    Json { message: String },

    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a verification failure that is neither expiry nor an invalid token
    pub fn verification_other<S: Into<String>>(cause: S) -> Self {
        Self::TokenVerificationOther {
            cause: cause.into(),
        }
    }

    /// Create a downstream transport failure
    pub fn downstream<S: Into<String>>(cause: S) -> Self {
        Self::DownstreamTransportFailure {
            cause: cause.into(),
        }
    }

    /// Get the HTTP status code returned to the caller for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuthHeader => StatusCode::UNAUTHORIZED,
            Self::MalformedAuthHeader => StatusCode::UNAUTHORIZED,
            Self::VerifierUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::TokenVerificationOther { .. } => StatusCode::UNAUTHORIZED,
            Self::MissingSubjectClaim => StatusCode::UNAUTHORIZED,
            Self::DownstreamTransportFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader => "missing_auth_header",
            Self::MalformedAuthHeader => "malformed_auth_header",
            Self::VerifierUnavailable => "verifier_unavailable",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::TokenVerificationOther { .. } => "token_verification_failed",
            Self::MissingSubjectClaim => "missing_subject_claim",
            Self::DownstreamTransportFailure { .. } => "downstream_transport_failure",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Render errors the same way the upstream Python services do: a JSON object with a
/// single `detail` field holding the display message.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "detail": self.to_string() });

        (status, Json(body)).into_response()
    }
}
