//! Core error types for macaron.
//!
//! This module provides the [`MacaronError`] enum covering every failure the
//! ORM can report: field validation, single-row lookups, schema binding,
//! relationship typing, query construction, and errors surfaced by the
//! embedded SQLite engine.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A field value rejected by its descriptor.
///
/// Records report the first failing field, with the message prefixed by the
/// model name.
///
/// # Examples
///
/// ```
/// use macaron_core::error::ValidationError;
///
/// let err = ValidationError::new("Member.age: max value is exceeded.", "max_value")
///     .with_param("max", "18");
/// assert_eq!(err.to_string(), "Member.age: max value is exceeded.");
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "null", "max_length").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for macaron.
///
/// Validation errors are raised before any SQL runs. Integrity errors come
/// from the engine after a statement was rejected and are never handled
/// internally; the caller decides whether to roll back.
#[derive(Error, Debug)]
pub enum MacaronError {
    // ── Record lookups ───────────────────────────────────────────────

    /// A single-row lookup returned no rows.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A single-row lookup returned more than one row.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// Indexed access past the end of a query's result set.
    #[error("Index {index} out of range (result has {len} rows)")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// The number of rows the query produced.
        len: usize,
    },

    // ── Field values ─────────────────────────────────────────────────

    /// A field value failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    /// A record of the wrong type was assigned to a relationship.
    #[error("Type error: {0}")]
    TypeError(String),

    // ── Schema ───────────────────────────────────────────────────────

    /// Reflection was requested for a table that does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Creation was requested for a table that already exists.
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    /// Model declarations are inconsistent (unknown model or field,
    /// unresolved forward references, duplicate names).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Queries ──────────────────────────────────────────────────────

    /// A query could not be built (unknown lookup path, bad operator,
    /// invalid slice bounds).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Engine ───────────────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// The connection could not be opened or is already closed.
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MacaronError {
    /// Shorthand for a simple single-message validation error.
    pub fn validation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::ValidationError(ValidationError::new(message, code))
    }

    /// Returns `true` for errors raised by field validation.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }

    /// Returns `true` for engine-reported constraint violations.
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::IntegrityError(_))
    }
}

impl From<ValidationError> for MacaronError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, MacaronError>`.
pub type MacaronResult<T> = Result<T, MacaronError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("Member.part must not be null.", "null");
        assert_eq!(err.to_string(), "Member.part must not be null.");
    }

    #[test]
    fn test_validation_error_display_is_message() {
        let err = ValidationError::new("Member.age: max value is exceeded.", "max_value")
            .with_param("max", "18");
        assert_eq!(err.to_string(), "Member.age: max value is exceeded.");
        assert_eq!(
            MacaronError::from(err).to_string(),
            "Validation error: Member.age: max value is exceeded."
        );
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Text is too short.", "min_length").with_param("min", "3");
        assert_eq!(err.params.get("min").unwrap(), "3");
    }

    #[test]
    fn test_error_kinds() {
        assert!(MacaronError::validation("x", "y").is_validation());
        assert!(MacaronError::IntegrityError("UNIQUE".into()).is_integrity());
        assert!(!MacaronError::DoesNotExist("x".into()).is_integrity());
    }

    #[test]
    fn test_error_display() {
        let err = MacaronError::TableNotFound("team".into());
        assert_eq!(err.to_string(), "Table not found: team");

        let err = MacaronError::IndexOutOfRange { index: 5, len: 2 };
        assert_eq!(err.to_string(), "Index 5 out of range (result has 2 rows)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: MacaronError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_from_validation_error() {
        let err: MacaronError = ValidationError::new("bad", "invalid").into();
        assert!(matches!(err, MacaronError::ValidationError(_)));
    }
}
