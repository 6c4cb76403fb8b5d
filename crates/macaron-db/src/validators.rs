//! Field validators.
//!
//! Validators enforce constraints on field values before they are written.
//! The field descriptor builds the built-in ones from its own attributes
//! (`max_length`, `min`, `pattern`, ...) and runs any extra validators
//! attached with [`FieldDef::validator`](crate::fields::FieldDef::validator)
//! afterwards. Null values are never passed to a validator.

use std::fmt;

use macaron_core::{MacaronError, MacaronResult, ValidationError};
use regex::Regex;

use crate::value::Value;

/// A trait for validating field values.
///
/// # Examples
///
/// ```
/// use macaron_db::validators::{Validator, MaxLengthValidator};
/// use macaron_db::value::Value;
///
/// let v = MaxLengthValidator::new(5);
/// assert!(v.validate(&Value::String("hi".into())).is_ok());
/// assert!(v.validate(&Value::String("toolong".into())).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning an error if invalid.
    fn validate(&self, value: &Value) -> MacaronResult<()>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

fn invalid(message: impl Into<String>, code: &str) -> MacaronError {
    MacaronError::ValidationError(ValidationError::new(message, code))
}

fn char_count(value: &Value) -> Option<usize> {
    value.as_str().map(|s| s.chars().count())
}

/// Validates that a string value does not exceed a maximum length.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length, in characters.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator` with the given maximum length.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        match char_count(value) {
            Some(n) if n > self.max_length => Err(invalid("Text is too long.", "max_length")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

/// Validates that a string value meets a minimum length requirement.
#[derive(Debug, Clone)]
pub struct MinLengthValidator {
    /// The minimum required length, in characters.
    pub min_length: usize,
}

impl MinLengthValidator {
    /// Creates a new `MinLengthValidator` with the given minimum length.
    pub const fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Validator for MinLengthValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        match char_count(value) {
            Some(n) if n < self.min_length => Err(invalid("Text is too short.", "min_length")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinLengthValidator"
    }
}

/// Validates that a string value has an exact length.
#[derive(Debug, Clone)]
pub struct LengthValidator {
    /// The required length, in characters.
    pub length: usize,
}

impl LengthValidator {
    /// Creates a new `LengthValidator` with the given length.
    pub const fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Validator for LengthValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        match char_count(value) {
            Some(n) if n != self.length => Err(invalid(
                format!("Text length must be {}.", self.length),
                "length",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "LengthValidator"
    }
}

/// Validates that a numeric value does not exceed a maximum.
#[derive(Debug, Clone)]
pub struct MaxValueValidator {
    /// The maximum allowed value.
    pub max_value: f64,
}

impl MaxValueValidator {
    /// Creates a new `MaxValueValidator` with the given maximum.
    pub const fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl Validator for MaxValueValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        match value.as_float() {
            Some(n) if n > self.max_value => Err(invalid("Max value is exceeded.", "max_value")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxValueValidator"
    }
}

/// Validates that a numeric value meets a minimum requirement.
#[derive(Debug, Clone)]
pub struct MinValueValidator {
    /// The minimum required value.
    pub min_value: f64,
}

impl MinValueValidator {
    /// Creates a new `MinValueValidator` with the given minimum.
    pub const fn new(min_value: f64) -> Self {
        Self { min_value }
    }
}

impl Validator for MinValueValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        match value.as_float() {
            Some(n) if n < self.min_value => Err(invalid("Min value is underrun.", "min_value")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinValueValidator"
    }
}

/// Validates that a string value matches a regular expression at its start.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    /// The pattern to match.
    pub pattern: Regex,
}

impl RegexValidator {
    /// Creates a new `RegexValidator` for the given pattern.
    pub const fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &Value) -> MacaronResult<()> {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        match self.pattern.find(s) {
            Some(m) if m.start() == 0 => Ok(()),
            _ => Err(invalid(
                format!("'{s}' does not match the pattern."),
                "invalid",
            )),
        }
    }

    fn name(&self) -> &str {
        "RegexValidator"
    }
}
