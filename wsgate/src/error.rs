//! Error types, stable error codes and HTTP/wire response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::ws::frames::RspCode;

/// Result type alias using the gateway error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
///
/// Every variant maps to a stable snake_case error code, an HTTP status and a
/// wire status code, so the same error renders uniformly on both surfaces.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Validation error (schema mismatch, malformed input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Authorization error
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource conflict (duplicate-unique violation)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Request body larger than the configured maximum
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(Box::new(err))
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        match err {
            deadpool_redis::PoolError::Backend(e) => Self::Redis(Box::new(e)),
            other => Self::Internal(format!("Redis pool error: {}", other)),
        }
    }
}

impl Error {
    /// Stable error code identifier carried in every error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "internal_error",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "authentication_failed",
            Self::Forbidden(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Database(_) => "database_error",
            Self::Redis(_) => "redis_error",
            Self::Io(_) => "internal_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Config(_)
            | Self::Database(_)
            | Self::Redis(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire status code this error maps to on the WebSocket surface
    pub fn wire_status(&self) -> RspCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => RspCode::InvalidData,
            Self::Unauthorized(_) | Self::Forbidden(_) => RspCode::PermissionDenied,
            _ => RspCode::Error,
        }
    }

    /// Build the uniform error envelope for this error
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code().to_string(),
            msg: self.to_string(),
            details: None,
        }
    }
}

/// Uniform error envelope shared by the HTTP and WebSocket surfaces
///
/// HTTP bodies wrap it as `{"error": envelope}`; WebSocket responses embed
/// its fields in the response `data`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Stable error code (`validation_error`, `not_found`, ...)
    pub code: String,

    /// Human-readable message
    pub msg: String,

    /// Optional structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            msg: msg.into(),
            details: None,
        }
    }
}

/// HTTP error body: `{"error": {code, msg, details}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorEnvelope,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.envelope(),
        };

        (status, Json(body)).into_response()
    }
}
