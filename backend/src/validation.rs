//! Request validation for the QuickPay API
//!
//! Provides type-safe validation with clear error messages. Every endpoint
//! validates before any domain logic runs, and violations are aggregated so a
//! caller sees the complete set of problems in one response.

use crate::error::{AppError, ValidationBuilder};
use std::collections::HashMap;

/// Validation result type
pub type ValidationResult<T> = Result<T, AppError>;

fn field_error(field: &str, message: String) -> AppError {
    let mut d = HashMap::new();
    d.insert(field.to_string(), vec![message]);
    AppError::ValidationError { details: d }
}

/// String validation helpers
pub mod string {
    use super::*;

    /// Validate required non-empty string
    pub fn required(value: &Option<String>, field: &str) -> ValidationResult<String> {
        match value {
            Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(_) => Err(field_error(field, format!("{} cannot be empty", field))),
            None => Err(field_error(field, format!("{} is required", field))),
        }
    }

    /// Validate optional string with max length
    pub fn max_length(
        value: &Option<String>,
        field: &str,
        max: usize,
    ) -> ValidationResult<Option<String>> {
        match value {
            Some(s) if s.len() > max => Err(field_error(
                field,
                format!("{} must be {} characters or less", field, max),
            )),
            Some(s) => Ok(Some(s.trim().to_string())),
            None => Ok(None),
        }
    }
}

/// Email validation
pub mod email {
    use super::*;

    /// Validate email format, normalizing to lowercase
    pub fn validate(value: &str, field: &str) -> ValidationResult<String> {
        let email = value.trim().to_lowercase();

        if email.is_empty() {
            return Err(field_error(field, format!("{} is required", field)));
        }

        // Must contain @ and have parts before and after
        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(field_error(field, "Invalid email format".to_string()));
        }

        // Domain must contain at least one dot
        if !parts[1].contains('.') {
            return Err(field_error(field, "Invalid email domain".to_string()));
        }

        Ok(email)
    }
}

/// Numeric validation
pub mod number {
    use super::*;

    /// Validate integer in range
    pub fn in_range(value: i64, field: &str, min: i64, max: i64) -> ValidationResult<i64> {
        if value < min || value > max {
            return Err(field_error(
                field,
                format!("{} must be between {} and {}", field, min, max),
            ));
        }
        Ok(value)
    }
}

/// Enum validation
pub mod enums {
    use super::*;

    /// Validate value is one of allowed options, normalizing case
    pub fn one_of(value: &str, field: &str, allowed: &[&str]) -> ValidationResult<String> {
        let lower = value.to_lowercase();
        if allowed.contains(&lower.as_str()) {
            Ok(lower)
        } else {
            Err(field_error(
                field,
                format!("{} must be one of: {}", field, allowed.join(", ")),
            ))
        }
    }
}

/// Validator builder for complex validations
pub struct Validator {
    builder: ValidationBuilder,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            builder: ValidationBuilder::new(),
        }
    }

    /// Add error for a field
    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.builder = self.builder.error(field, message);
        self
    }

    /// Add error if condition is true
    pub fn error_if(self, condition: bool, field: &str, message: &str) -> Self {
        if condition {
            self.error(field, message)
        } else {
            self
        }
    }

    /// Validate required string
    pub fn required_string(self, value: &Option<String>, field: &str) -> Self {
        match value {
            Some(s) if !s.trim().is_empty() => self,
            Some(_) => self.error(field, &format!("{} cannot be empty", field)),
            None => self.error(field, &format!("{} is required", field)),
        }
    }

    /// Validate email format
    pub fn email(self, value: &Option<String>, field: &str) -> Self {
        match value {
            Some(e) if !e.trim().is_empty() => {
                if email::validate(e, field).is_err() {
                    self.error(field, "Invalid email format")
                } else {
                    self
                }
            }
            Some(_) | None => self.error(field, &format!("{} is required", field)),
        }
    }

    /// Validate max length on an optional string
    pub fn max_length(self, value: &Option<String>, field: &str, max: usize) -> Self {
        match value {
            Some(s) if s.len() > max => {
                self.error(field, &format!("{} must be {} characters or less", field, max))
            }
            _ => self,
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        !self.builder.has_errors()
    }

    /// Finish validation, returning error if any
    pub fn finish(self) -> ValidationResult<()> {
        match self.builder.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Payment lifecycle states
pub const PAYMENT_STATUSES: &[&str] = &[
    "pending", "processing", "completed", "failed", "cancelled",
];

/// Accepted payment methods
pub const PAYMENT_METHODS: &[&str] = &["card", "bank_transfer", "paypal", "stripe", "manual"];

/// Maximum length for free-text notes
pub const MAX_NOTES_LENGTH: usize = 1000;

/// Maximum length for a client address
pub const MAX_ADDRESS_LENGTH: usize = 500;
