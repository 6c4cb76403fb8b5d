//! Field type definitions for the ORM.
//!
//! [`FieldKind`] is the semantic kind of a column and [`FieldDef`] captures
//! everything about a single field: nullability, default, constraints, and
//! the three conversions every write and read goes through.
//!
//! - [`FieldDef::cast`] normalizes an assigned value to the object form.
//! - [`FieldDef::to_database`] converts the object form to what SQLite stores.
//! - [`FieldDef::to_object`] converts a stored value back.

use std::fmt;
use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult};
use regex::Regex;

use super::converters::{FieldConverter, JsonConverter};
use super::temporal;
use crate::validators::{
    LengthValidator, MaxLengthValidator, MaxValueValidator, MinLengthValidator,
    MinValueValidator, RegexValidator, Validator,
};
use crate::value::Value;

/// The semantic kind of a field, determining its column type and conversions.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Surrogate integer key assigned by the engine.
    Serial,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating-point number.
    Float,
    /// Character data, `VARCHAR(n)` when a max length is set.
    Char,
    /// Unlimited text.
    Text,
    /// Boolean stored as 0/1.
    Boolean,
    /// Date and time stored as text.
    Timestamp,
    /// Date stored as text.
    Date,
    /// Time of day stored as text.
    Time,
    /// Opaque value converted by a user-supplied converter.
    Custom(Arc<dyn FieldConverter>),
}

impl FieldKind {
    /// Returns `true` for the integer-backed kinds.
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Serial | Self::Integer)
    }

    /// Returns `true` for the numeric kinds.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Serial | Self::Integer | Self::Float)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Serial => "serial",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Char => "char",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
            Self::Custom(_) => "custom",
        };
        f.write_str(name)
    }
}

/// When the engine computes a field's value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoNow {
    /// Overwritten with the current time when the record is created.
    OnCreate,
    /// Overwritten with the current time on create and on every save.
    OnSave,
}

/// Complete definition of a model field.
///
/// Built with a kind constructor and chained modifiers:
///
/// ```
/// use macaron_db::fields::FieldDef;
///
/// let age = FieldDef::integer("age").min(15.0).max(18.0).default(16);
/// assert_eq!(age.column, "age");
/// assert!(!age.null);
/// ```
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The field name used by records and lookups.
    pub name: String,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The kind of this field.
    pub kind: FieldKind,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Default value for new records.
    pub default: Option<Value>,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length.
    pub max_length: Option<usize>,
    /// Minimum character length.
    pub min_length: Option<usize>,
    /// Exact character length.
    pub length: Option<usize>,
    /// Minimum numeric value.
    pub min: Option<f64>,
    /// Maximum numeric value.
    pub max: Option<f64>,
    /// Pattern the value must match from its first character.
    pub pattern: Option<Regex>,
    /// Engine-computed value, if any.
    pub auto: Option<AutoNow>,
    /// `false` for descriptors inferred from the live table.
    pub user_defined: bool,
    /// Extra validators run after the built-in checks.
    pub validators: Vec<Arc<dyn Validator>>,
}

impl FieldDef {
    /// Creates a new non-null `FieldDef` of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            max_length: None,
            min_length: None,
            length: None,
            min: None,
            max: None,
            pattern: None,
            auto: None,
            user_defined: true,
            validators: Vec::new(),
        }
    }

    /// A surrogate integer primary key. Nullable until the engine assigns it.
    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Serial).primary_key().nullable()
    }

    /// An integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// A floating-point field.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    /// A character field; add [`max_length`](Self::max_length) for `VARCHAR(n)`.
    pub fn char(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Char)
    }

    /// A text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// A boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// A timestamp field.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    /// A date field.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// A time-of-day field.
    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Time)
    }

    /// A character field whose values must match `pattern`.
    pub fn matching(name: impl Into<String>, pattern: Regex) -> Self {
        Self::char(name).pattern(pattern)
    }

    /// A custom field converted by `converter`.
    pub fn custom(name: impl Into<String>, converter: impl FieldConverter + 'static) -> Self {
        Self::new(name, FieldKind::Custom(Arc::new(converter)))
    }

    /// A JSON document stored as text.
    pub fn json(name: impl Into<String>) -> Self {
        Self::custom(name, JsonConverter)
    }

    /// A timestamp set when the record is created.
    pub fn timestamp_at_create(name: impl Into<String>) -> Self {
        Self::timestamp(name).auto_now(AutoNow::OnCreate)
    }

    /// A timestamp set on create and on every save.
    pub fn timestamp_at_save(name: impl Into<String>) -> Self {
        Self::timestamp(name).auto_now(AutoNow::OnSave)
    }

    /// A date set when the record is created.
    pub fn date_at_create(name: impl Into<String>) -> Self {
        Self::date(name).auto_now(AutoNow::OnCreate)
    }

    /// A date set on create and on every save.
    pub fn date_at_save(name: impl Into<String>) -> Self {
        Self::date(name).auto_now(AutoNow::OnSave)
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets nullability explicitly.
    #[must_use]
    pub const fn null(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value for new records.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the minimum character length.
    #[must_use]
    pub const fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Requires an exact character length.
    #[must_use]
    pub const fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the minimum numeric value.
    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the maximum numeric value.
    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Requires values to match `pattern` from their first character.
    #[must_use]
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Lets the engine compute this field. Auto fields are always nullable.
    #[must_use]
    pub const fn auto_now(mut self, auto: AutoNow) -> Self {
        self.auto = Some(auto);
        self.null = true;
        self
    }

    /// Attaches an extra validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Returns `true` for a primary key the engine assigns.
    pub const fn is_auto_key(&self) -> bool {
        self.primary_key && self.kind.is_integer()
    }

    /// The value a new record starts with.
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// The engine-computed value for this field at the given stage, if any.
    pub fn auto_value(&self, creating: bool) -> Option<Value> {
        let applies = match self.auto? {
            AutoNow::OnCreate => creating,
            AutoNow::OnSave => true,
        };
        if !applies {
            return None;
        }
        let now = temporal::now();
        match self.kind {
            FieldKind::Date => Some(Value::Date(now.date())),
            FieldKind::Time => Some(Value::Time(now.time())),
            _ => Some(Value::DateTime(now)),
        }
    }

    /// The declared column type used in generated DDL.
    pub fn sql_type(&self) -> String {
        match &self.kind {
            FieldKind::Serial | FieldKind::Integer => "INTEGER".to_string(),
            FieldKind::Float => "REAL".to_string(),
            FieldKind::Char => self
                .max_length
                .map_or_else(|| "TEXT".to_string(), |n| format!("VARCHAR({n})")),
            FieldKind::Text => "TEXT".to_string(),
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Timestamp => "TIMESTAMP".to_string(),
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Time => "TIME".to_string(),
            FieldKind::Custom(conv) => conv.sql_type().to_string(),
        }
    }

    fn invalid(&self, message: impl fmt::Display, code: &str) -> MacaronError {
        MacaronError::ValidationError(
            macaron_core::ValidationError::new(format!("{}: {message}", self.name), code)
                .with_param("field", self.name.clone()),
        )
    }

    fn qualify(&self, err: MacaronError) -> MacaronError {
        match err {
            MacaronError::ValidationError(ve) => {
                let code = ve.code.clone();
                self.invalid(ve, &code)
            }
            other => other,
        }
    }

    fn cast_failure(&self, value: &Value) -> MacaronError {
        self.invalid(
            format!("'{value}' cannot be converted to {}.", self.kind),
            "invalid",
        )
    }

    /// Normalizes an assigned value to this field's object form.
    ///
    /// Null always passes through.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn cast(&self, value: Value) -> MacaronResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let shown = value.clone();
        let cast = match (&self.kind, value) {
            (FieldKind::Serial | FieldKind::Integer, v) => match v {
                Value::Int(_) => Some(v),
                Value::Bool(b) => Some(Value::Int(i64::from(b))),
                Value::Float(f) if f.fract() == 0.0 => Some(Value::Int(f as i64)),
                Value::String(ref s) => s.trim().parse::<i64>().ok().map(Value::Int),
                _ => None,
            },
            (FieldKind::Float, v) => match v {
                Value::Float(_) => Some(v),
                Value::Int(i) => Some(Value::Float(i as f64)),
                Value::String(ref s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            (FieldKind::Char | FieldKind::Text, v) => match v {
                Value::String(_) => Some(v),
                Value::Bytes(_) | Value::List(_) => None,
                Value::DateTime(dt) => Some(Value::String(temporal::format_timestamp(&dt))),
                Value::Date(d) => Some(Value::String(temporal::format_date(&d))),
                Value::Time(t) => Some(Value::String(temporal::format_time(&t))),
                other => Some(Value::String(other.to_string())),
            },
            (FieldKind::Boolean, v) => match v {
                Value::Bool(_) => Some(v),
                Value::Int(i) => Some(Value::Bool(i != 0)),
                Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Some(Value::Bool(true)),
                    "false" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            (FieldKind::Timestamp, v) => match v {
                Value::DateTime(_) => Some(v),
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
                Value::String(ref s) => temporal::parse_timestamp(s).map(Value::DateTime),
                _ => None,
            },
            (FieldKind::Date, v) => match v {
                Value::Date(_) => Some(v),
                Value::DateTime(dt) => Some(Value::Date(dt.date())),
                Value::String(ref s) => temporal::parse_date(s).map(Value::Date),
                _ => None,
            },
            (FieldKind::Time, v) => match v {
                Value::Time(_) => Some(v),
                Value::DateTime(dt) => Some(Value::Time(dt.time())),
                Value::String(ref s) => temporal::parse_time(s).map(Value::Time),
                _ => None,
            },
            (FieldKind::Custom(conv), v) => {
                return conv.cast(v).map_err(|e| self.qualify(e));
            }
        };
        cast.ok_or_else(|| self.cast_failure(&shown))
    }

    /// Checks a value against nullability, type, and every constraint.
    pub fn validate(&self, value: &Value) -> MacaronResult<()> {
        if value.is_null() {
            if self.null {
                return Ok(());
            }
            return Err(self.invalid("must not be null.", "null"));
        }
        self.check_type(value)?;

        let mut builtin: Vec<Box<dyn Validator>> = Vec::new();
        if let Some(n) = self.max_length {
            builtin.push(Box::new(MaxLengthValidator::new(n)));
        }
        if let Some(n) = self.min_length {
            builtin.push(Box::new(MinLengthValidator::new(n)));
        }
        if let Some(n) = self.length {
            builtin.push(Box::new(LengthValidator::new(n)));
        }
        if let Some(m) = self.max {
            builtin.push(Box::new(MaxValueValidator::new(m)));
        }
        if let Some(m) = self.min {
            builtin.push(Box::new(MinValueValidator::new(m)));
        }
        if let Some(re) = &self.pattern {
            builtin.push(Box::new(RegexValidator::new(re.clone())));
        }

        for v in &builtin {
            v.validate(value).map_err(|e| self.qualify(e))?;
        }
        for v in &self.validators {
            v.validate(value).map_err(|e| self.qualify(e))?;
        }
        Ok(())
    }

    fn check_type(&self, value: &Value) -> MacaronResult<()> {
        let ok = match &self.kind {
            FieldKind::Serial | FieldKind::Integer => matches!(value, Value::Int(_)),
            FieldKind::Float => matches!(value, Value::Float(_) | Value::Int(_)),
            FieldKind::Char | FieldKind::Text => matches!(value, Value::String(_)),
            FieldKind::Boolean => matches!(value, Value::Bool(_)),
            FieldKind::Timestamp => matches!(value, Value::DateTime(_)),
            FieldKind::Date => matches!(value, Value::Date(_)),
            FieldKind::Time => matches!(value, Value::Time(_)),
            FieldKind::Custom(conv) => return conv.validate(value).map_err(|e| self.qualify(e)),
        };
        if ok {
            Ok(())
        } else {
            Err(self.invalid(
                format!("expected {}, got {}.", self.kind, value.type_name()),
                "invalid",
            ))
        }
    }

    /// Converts an object-form value to what is stored in the column.
    pub fn to_database(&self, value: &Value) -> MacaronResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(match (&self.kind, value) {
            (FieldKind::Custom(conv), v) => return conv.to_database(v),
            (FieldKind::Boolean, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (_, Value::DateTime(dt)) => Value::String(temporal::format_timestamp(dt)),
            (_, Value::Date(d)) => Value::String(temporal::format_date(d)),
            (_, Value::Time(t)) => Value::String(temporal::format_time(t)),
            (_, v) => v.clone(),
        })
    }

    /// Converts a stored column value back to the object form.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_object(&self, value: Value) -> MacaronResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match (&self.kind, value) {
            (FieldKind::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (FieldKind::Boolean, Value::Int(i)) => Some(Value::Bool(i != 0)),
            (FieldKind::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldKind::Timestamp, Value::String(s)) => {
                temporal::parse_timestamp(&s).map(Value::DateTime)
            }
            (FieldKind::Date, Value::String(s)) => temporal::parse_date(&s).map(Value::Date),
            (FieldKind::Time, Value::String(s)) => temporal::parse_time(&s).map(Value::Time),
            (FieldKind::Custom(conv), v) => return conv.to_object(v),
            (_, v) => Some(v),
        };
        converted.ok_or_else(|| {
            MacaronError::DatabaseError(format!(
                "Column \"{}\" holds a value that is not a valid {}",
                self.column, self.kind
            ))
        })
    }
}
