//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON document (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `MACARON_DEBUG` | `debug` |
//! | `MACARON_LOG_LEVEL` | `log_level` |
//! | `MACARON_DATABASE_NAME` | `database.name` |
//! | `MACARON_DATABASE_LAZY` | `database.lazy` |
//! | `MACARON_DATABASE_AUTOCOMMIT` | `database.autocommit` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use macaron_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("macaron.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::MacaronError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the document keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, MacaronError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| MacaronError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, MacaronError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        MacaronError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, MacaronError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, MacaronError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| MacaronError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `MACARON_*` environment variable overrides to a settings struct.
///
/// Boolean variables accept "true", "1" and "yes" (case-insensitive); any
/// other value is `false`.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("MACARON_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("MACARON_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("MACARON_DATABASE_NAME") {
        settings.database.name = val;
    }

    if let Ok(val) = std::env::var("MACARON_DATABASE_LAZY") {
        settings.database.lazy = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("MACARON_DATABASE_AUTOCOMMIT") {
        settings.database.autocommit = parse_bool(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, MacaronError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        MacaronError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        MacaronError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = true
            log_level = "macaron=debug"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "macaron=debug");
        // Defaults preserved
        assert_eq!(settings.database.name, ":memory:");
    }

    #[test]
    fn test_from_toml_str_database() {
        let toml = r#"
            [database]
            name = "members.db"
            lazy = true
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.database.name, "members.db");
        assert!(settings.database.lazy);
        assert!(!settings.database.autocommit);
        assert!(settings.database.foreign_keys);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("debug = [");
        assert!(matches!(result, Err(MacaronError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("debug = \"sometimes\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_str() {
        let settings =
            from_json_str(r#"{"database": {"autocommit": true}}"#).unwrap();
        assert!(settings.database.autocommit);
        assert_eq!(settings.database.name, ":memory:");
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macaron.toml");
        std::fs::write(&path, "[database]\nname = \"app.db\"\n").unwrap();
        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.database.name, "app.db");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/macaron.toml");
        assert!(matches!(result, Err(MacaronError::ConfigurationError(_))));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("YES"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"a": {"b": 1, "c": 2}});
        let over = serde_json::json!({"a": {"c": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged, serde_json::json!({"a": {"b": 1, "c": 3}}));
    }
}
