//! Error types for PoliKG services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling
//!
//! The reasoning core never lets these escape a turn: store and collaborator
//! failures are degraded in place. They surface only at the service boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    UnknownVocabulary,

    // Rate limiting (6xxx)
    RateLimited,

    // Graph store errors (7xxx)
    GraphStoreError,
    GraphStoreTimeout,

    // External service errors (8xxx)
    UpstreamError,
    LlmError,
    LlmTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::UnknownVocabulary => 1003,

            ErrorCode::RateLimited => 6001,

            ErrorCode::GraphStoreError => 7001,
            ErrorCode::GraphStoreTimeout => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::LlmError => 8002,
            ErrorCode::LlmTimeout => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unknown {kind}: {value}")]
    UnknownVocabulary { kind: String, value: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Graph store errors
    #[error("Graph store error: {message}")]
    GraphStore { message: String },

    #[error("Graph store query timed out after {timeout_ms}ms")]
    GraphStoreTimeout { timeout_ms: u64 },

    // External service errors
    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("LLM call timed out after {timeout_ms}ms")]
    LlmTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnknownVocabulary { .. } => ErrorCode::UnknownVocabulary,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::GraphStore { .. } => ErrorCode::GraphStoreError,
            AppError::GraphStoreTimeout { .. } => ErrorCode::GraphStoreTimeout,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::LlmTimeout { .. } => ErrorCode::LlmTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::UnknownVocabulary { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::GraphStore { .. }
            | AppError::Llm { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::GraphStoreTimeout { .. } | AppError::LlmTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Deadline expiries, as opposed to failed calls
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::GraphStoreTimeout { .. } | AppError::LlmTimeout { .. }
        )
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::GraphStoreTimeout { timeout_ms: 500 };
        assert_eq!(err.code(), ErrorCode::GraphStoreTimeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "question is empty".into(),
            field: Some("question".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unknown_vocabulary_is_client_error() {
        let err = AppError::UnknownVocabulary {
            kind: "entity type".into(),
            value: "Spaceship".into(),
        };
        assert_eq!(err.code().as_code(), 1003);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_error() {
        let err = AppError::GraphStore {
            message: "connection refused".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_server_error());
        assert!(!err.is_timeout());
    }
}
