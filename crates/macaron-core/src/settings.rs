//! Settings for macaron.
//!
//! [`Settings`] holds the logging configuration and the [`DatabaseSettings`]
//! used to open the SQLite connection. All fields have defaults so a partial
//! TOML or JSON document is enough to configure a program (see
//! [`settings_loader`](crate::settings_loader)).

use serde::{Deserialize, Serialize};

/// Connection configuration for the embedded SQLite database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database file path, or `:memory:` for an in-memory database.
    pub name: String,
    /// Defer opening the connection until the first statement is executed.
    pub lazy: bool,
    /// Commit pending changes when the connection is closed.
    pub autocommit: bool,
    /// Enforce foreign key constraints (`PRAGMA foreign_keys = ON`).
    pub foreign_keys: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: ":memory:".to_string(),
            lazy: false,
            autocommit: false,
            foreign_keys: true,
        }
    }
}

impl DatabaseSettings {
    /// Settings for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Settings for a database file.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            name: path.into(),
            ..Self::default()
        }
    }

    /// Enables the lazy connection variant.
    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Enables commit-on-close.
    #[must_use]
    pub const fn autocommit(mut self) -> Self {
        self.autocommit = true;
        self
    }

    /// Returns `true` if this configuration targets an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.name == ":memory:"
    }
}

/// The complete set of macaron settings.
///
/// # Examples
///
/// ```
/// use macaron_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.debug);
/// assert_eq!(settings.database.name, ":memory:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty log output).
    pub debug: bool,
    /// Log filter directive passed to the tracing subscriber.
    pub log_level: String,
    /// Database connection settings.
    pub database: DatabaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
        }
    }
}
