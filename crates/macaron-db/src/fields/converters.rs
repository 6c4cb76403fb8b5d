//! Pluggable conversions for custom fields.
//!
//! A [`FieldKind::Custom`](super::FieldKind::Custom) field delegates its
//! column type, casting, validation, and both directions of conversion to a
//! [`FieldConverter`]. [`JsonConverter`] stores any JSON document as text.

use std::fmt;

use macaron_core::{MacaronError, MacaronResult};

use crate::value::Value;

/// Conversion hooks for a custom field.
///
/// Every method except [`sql_type`](FieldConverter::sql_type) has an identity
/// default. Null values never reach a converter.
pub trait FieldConverter: Send + Sync + fmt::Debug {
    /// The declared column type used in generated DDL.
    fn sql_type(&self) -> &str {
        "TEXT"
    }

    /// Normalizes an assigned value to the object form.
    fn cast(&self, value: Value) -> MacaronResult<Value> {
        Ok(value)
    }

    /// Checks an object-form value.
    fn validate(&self, _value: &Value) -> MacaronResult<()> {
        Ok(())
    }

    /// Converts the object form to what is stored in the column.
    fn to_database(&self, value: &Value) -> MacaronResult<Value> {
        Ok(value.clone())
    }

    /// Converts a stored column value back to the object form.
    fn to_object(&self, value: Value) -> MacaronResult<Value> {
        Ok(value)
    }
}

/// Stores arbitrary JSON documents as `TEXT`.
///
/// # Examples
///
/// ```
/// use macaron_db::fields::{FieldConverter, JsonConverter};
/// use macaron_db::value::Value;
///
/// let conv = JsonConverter;
/// let stored = conv
///     .to_database(&Value::Json(serde_json::json!({"Macaron": "Good!"})))
///     .unwrap();
/// assert_eq!(stored, Value::String(r#"{"Macaron":"Good!"}"#.into()));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl FieldConverter for JsonConverter {
    fn cast(&self, value: Value) -> MacaronResult<Value> {
        Ok(Value::Json(value_to_json(&value)?))
    }

    fn to_database(&self, value: &Value) -> MacaronResult<Value> {
        let json = value_to_json(value)?;
        Ok(Value::String(json.to_string()))
    }

    fn to_object(&self, value: Value) -> MacaronResult<Value> {
        match value {
            Value::String(s) => serde_json::from_str(&s).map(Value::Json).map_err(|e| {
                MacaronError::DatabaseError(format!("Invalid JSON document in column: {e}"))
            }),
            other => Ok(Value::Json(value_to_json(&other)?)),
        }
    }
}

fn value_to_json(value: &Value) -> MacaronResult<serde_json::Value> {
    Ok(match value {
        Value::Json(j) => j.clone(),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<MacaronResult<Vec<_>>>()?,
        ),
        other => serde_json::to_value(other).map_err(|e| {
            MacaronError::TypeError(format!("Cannot store {} as JSON: {e}", other.type_name()))
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let conv = JsonConverter;
        let doc = Value::Json(serde_json::json!({"a": [1, 2, {"b": null}]}));
        let stored = conv.to_database(&doc).unwrap();
        assert!(matches!(stored, Value::String(_)));
        assert_eq!(conv.to_object(stored).unwrap(), doc);
    }

    #[test]
    fn test_json_cast_wraps_plain_values() {
        let conv = JsonConverter;
        assert_eq!(
            conv.cast(Value::from("text")).unwrap(),
            Value::Json(serde_json::json!("text"))
        );
        assert_eq!(
            conv.cast(Value::List(vec![Value::Int(1), Value::Bool(true)]))
                .unwrap(),
            Value::Json(serde_json::json!([1, true]))
        );
    }

    #[test]
    fn test_json_invalid_document() {
        let conv = JsonConverter;
        assert!(conv.to_object(Value::from("{not json")).is_err());
    }

    #[test]
    fn test_default_sql_type() {
        assert_eq!(JsonConverter.sql_type(), "TEXT");
    }
}
