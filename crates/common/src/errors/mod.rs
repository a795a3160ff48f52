//! Error types for RoboDigest services
//!
//! Every failure that can reach the HTTP edge is an [`AppError`]. Each
//! variant carries a machine-readable [`ErrorCode`] and a status code,
//! and renders as `{"error": {"code", "message"}}`.

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
    // Request errors (1xxx)
    ValidationError,
    UnknownKind,

    // Resource errors (4xxx)
    NotFound,

    // Storage errors (7xxx)
    DatabaseError,
    ConnectionError,
    StorageError,

    // Internal errors (9xxx)
    ConfigurationError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Numeric form, stable across releases
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::UnknownKind => 1004,
            ErrorCode::NotFound => 4001,
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::StorageError => 7003,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unknown source kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl AppError {
    /// Shorthand for a configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnknownKind { .. } => ErrorCode::UnknownKind,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::UnknownKind { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Storage { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// True when a storage error is a uniqueness violation raised by a racing insert
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(err) => matches!(
                err.sql_err(),
                Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
            ),
            _ => false,
        }
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
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Storage and config internals never reach clients verbatim
        let message = if self.is_server_error() {
            tracing::error!(error = %self, code = ?code, status = status.as_u16(), "Server error");
            "internal error".to_string()
        } else {
            tracing::warn!(error = %self, code = ?code, status = status.as_u16(), "Client error");
            self.to_string()
        };
        let field = match self {
            AppError::Validation { field, .. } => field,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails { code, message, field },
        };
        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NotFound {
            resource_type: "video".into(),
            id: "BV1aa".into(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.code().as_code(), 4001);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::UnknownKind { kind: "podcasts".into() };
        assert_eq!(err.code(), ErrorCode::UnknownKind);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Storage {
            message: "disk full".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
        assert!(!err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_validation_body_names_field() {
        let (status, body) = body_of(AppError::Validation {
            message: "limit out of range".into(),
            field: Some("limit".into()),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "limit");
    }

    #[tokio::test]
    async fn test_server_error_body_is_masked() {
        let (status, body) = body_of(AppError::config("missing APP__DATABASE__URL")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
        assert_eq!(body["error"]["message"], "internal error");
        assert!(body["error"].get("field").is_none());
    }
}
