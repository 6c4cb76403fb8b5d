//! Keyword lookups.
//!
//! A keyword filter key is a `__`-separated path optionally ending in an
//! operator suffix: `age__lt`, `mygroup__name`, `movies__title__in`. The
//! suffix is parsed into a [`Lookup`]; a key without one compares for
//! equality.
//!
//! ```
//! use macaron_db::query::lookups::{split_lookup, Lookup};
//!
//! assert_eq!(split_lookup("age__lt"), (vec!["age"], Lookup::Lt));
//! assert_eq!(split_lookup("mygroup__name"), (vec!["mygroup", "name"], Lookup::Exact));
//! ```

use macaron_core::{MacaronError, MacaronResult};

use crate::fields::FieldDef;
use crate::record::Record;
use crate::value::Value;

/// A comparison operator selected by a keyword suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// `=`; also the default when no suffix is given.
    Exact,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `!=`
    Ne,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
    /// `BETWEEN ? AND ?`
    Between,
    /// `NOT BETWEEN ? AND ?`
    NotBetween,
    /// `LIKE`
    Like,
    /// `GLOB`
    Glob,
    /// `REGEXP`, provided by the backend.
    Regexp,
}

impl Lookup {
    /// Parses a keyword suffix.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "exact" => Self::Exact,
            "lt" => Self::Lt,
            "le" => Self::Le,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            "ne" => Self::Ne,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "between" => Self::Between,
            "not_between" => Self::NotBetween,
            "like" => Self::Like,
            "glob" => Self::Glob,
            "regexp" => Self::Regexp,
            _ => return None,
        })
    }

    const fn operator(self) -> &'static str {
        match self {
            Self::Exact => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Ne => "!=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
            Self::Like => "LIKE",
            Self::Glob => "GLOB",
            Self::Regexp => "REGEXP",
        }
    }

    /// Pattern operators take their argument verbatim instead of converting
    /// it through the field.
    const fn is_pattern(self) -> bool {
        matches!(self, Self::Like | Self::Glob | Self::Regexp)
    }

    /// Compiles `column <op> <placeholders>`, pushing converted parameters.
    ///
    /// `field` is the descriptor of the compared column; parameters go
    /// through its cast and `to_database` conversions.
    pub fn compile(
        self,
        column: &str,
        arg: Arg,
        field: &FieldDef,
        params: &mut Vec<Value>,
    ) -> MacaronResult<String> {
        let value = match arg {
            Arg::NotNull => {
                return match self {
                    Self::Exact => Ok(format!("{column} IS NOT NULL")),
                    Self::Ne => Ok(format!("{column} IS NULL")),
                    _ => Err(self.unsupported("NotNull")),
                };
            }
            Arg::Value(Value::Null) => {
                return match self {
                    Self::Exact => Ok(format!("{column} IS NULL")),
                    Self::Ne => Ok(format!("{column} IS NOT NULL")),
                    _ => Err(self.unsupported("NULL")),
                };
            }
            Arg::Value(value) => value,
            Arg::Record(record) => {
                return Err(MacaronError::TypeError(format!(
                    "a {} record must be compared through a relation",
                    record.model_name()
                )));
            }
        };

        let convert = |v: Value| -> MacaronResult<Value> {
            if self.is_pattern() {
                Ok(v)
            } else {
                field.to_database(&field.cast(v)?)
            }
        };

        match self {
            Self::In | Self::NotIn => {
                let items = match value {
                    Value::List(items) => items,
                    other => vec![other],
                };
                let placeholders = vec!["?"; items.len()].join(", ");
                for item in items {
                    params.push(convert(item)?);
                }
                Ok(format!("{column} {} ({placeholders})", self.operator()))
            }
            Self::Between | Self::NotBetween => {
                let bounds = match value {
                    Value::List(items) if items.len() == 2 => items,
                    other => {
                        return Err(MacaronError::InvalidQuery(format!(
                            "{} expects two bounds, got {other}",
                            self.operator()
                        )));
                    }
                };
                for bound in bounds {
                    params.push(convert(bound)?);
                }
                Ok(format!("{column} {} ? AND ?", self.operator()))
            }
            _ => {
                params.push(convert(value)?);
                Ok(format!("{column} {} ?", self.operator()))
            }
        }
    }

    fn unsupported(self, what: &str) -> MacaronError {
        MacaronError::InvalidQuery(format!("{what} cannot be used with {}", self.operator()))
    }
}

/// Splits a keyword key into its path and operator.
pub fn split_lookup(key: &str) -> (Vec<&str>, Lookup) {
    let mut parts: Vec<&str> = key.split("__").collect();
    if parts.len() > 1 {
        if let Some(lookup) = parts.last().and_then(|s| Lookup::from_suffix(s)) {
            parts.pop();
            return (parts, lookup);
        }
    }
    (parts, Lookup::Exact)
}

/// The right-hand side of a keyword filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A value to compare with; `Null` compiles to `IS NULL`.
    Value(Value),
    /// Compiles to `IS NOT NULL`.
    NotNull,
    /// A record compared by key; only valid against a column that refers to
    /// the record's model.
    Record(Box<Record>),
}

impl<T: Into<Value>> From<T> for Arg {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl From<&Record> for Arg {
    fn from(record: &Record) -> Self {
        Self::Record(Box::new(record.clone()))
    }
}
