//! Standardized error handling for the QuickPay API
//!
//! This module provides a consistent error response format across all endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    /// Stable error category (e.g. "Validation failed", "Not found")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    // Convenience constructors for common error types

    /// Create a 404 Not Found error
    pub fn not_found(resource: impl Into<String>) -> AppError {
        AppError::NotFound(resource.into())
    }

    /// Create a 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> AppError {
        AppError::InternalError(message.into())
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> AppError {
        AppError::BadRequest(message.into())
    }

    /// Create a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> AppError {
        AppError::Conflict(message.into())
    }

    /// Create a validation error with a single field error
    pub fn validation_single(field: impl Into<String>, message: impl Into<String>) -> AppError {
        let mut details = HashMap::new();
        details.insert(field.into(), vec![message.into()]);
        AppError::ValidationError { details }
    }

    /// Create a validation error with multiple field errors
    pub fn validation(details: HashMap<String, Vec<String>>) -> AppError {
        AppError::ValidationError { details }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum AppError {
    // Input errors
    ValidationError { details: HashMap<String, Vec<String>> },
    BadRequest(String),

    // Resource errors
    NotFound(String),
    Conflict(String),

    // Persistence errors
    /// A multi-row write was left half-applied and the compensating rollback
    /// also failed. Never auto-retried; requires manual reconciliation.
    PartialFailure(String),
    /// Transient store outage; the whole request is safe to retry.
    StoreUnavailable(String),
    DatabaseError(String),

    // Server errors
    InternalError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PartialFailure(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the stable error category string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "Validation failed",
            Self::BadRequest(_) => "Bad request",
            Self::NotFound(_) => "Not found",
            Self::Conflict(_) => "Conflict",
            Self::PartialFailure(_) => "Partial failure",
            Self::StoreUnavailable(_) => "Store unavailable",
            Self::DatabaseError(_) => "Database error",
            Self::InternalError(_) => "Internal error",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::ValidationError { .. } => "One or more fields failed validation".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::NotFound(resource) => format!("{} not found", resource),
            Self::Conflict(msg) => msg.clone(),
            Self::PartialFailure(msg) => {
                tracing::error!("Partial failure requiring reconciliation: {}", msg);
                format!("{}. The operation was left partially applied and has been flagged for reconciliation", msg)
            }
            Self::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                "The data store is temporarily unavailable. Please retry".to_string()
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        // Add details for validation errors
        if let Self::ValidationError { details } = &self {
            error.details = Some(details.clone());
        }

        (status, Json(error)).into_response()
    }
}

/// Adapter from sqlx/driver errors into the internal taxonomy. Every store
/// error crossing the workflow boundary goes through here; nothing else
/// inspects provider-specific codes.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation
                Some("23505") => Self::Conflict("Resource already exists".to_string()),
                // foreign_key_violation
                Some("23503") => Self::BadRequest("Referenced resource does not exist".to_string()),
                _ => Self::DatabaseError(db.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::StoreUnavailable(err.to_string())
            }
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper to add multiple validation errors
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_insert_with(Vec::new)
            .push(message.to_string());
        self
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
