//! # macaron
//!
//! A small declarative ORM for SQLite.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access
//! and wires settings to a connection with [`connect`]. You can depend on
//! `macaron` to get everything, or depend on individual crates for
//! finer-grained control.
//!
//! ```
//! use macaron::db::fields::FieldDef;
//! use macaron::db::model::ModelDef;
//! use macaron::db::{kwargs, Registry};
//! use macaron::core::Settings;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         ModelDef::builder("Team")
//!             .field(FieldDef::char("name").max_length(20))
//!             .build()?,
//!     )?;
//!
//! let db = macaron::connect(&Settings::default(), registry)?;
//! db.create_table("Team")?;
//! let team = db.objects("Team")?.create(kwargs! { "name" => "Fresh" })?;
//! assert_eq!(team.get_as::<String>("name")?, "Fresh");
//! # Ok::<(), macaron::core::MacaronError>(())
//! ```

/// Core types: settings, logging, and error types.
pub use macaron_core as core;

/// ORM: model definitions, registry, `QuerySet`, records, and transactions.
pub use macaron_db as db;

/// Database backends: `SQLite`.
pub use macaron_db_backends as db_backends;

pub use chrono;
pub use serde_json;

use macaron_core::{MacaronResult, Settings};
use macaron_db::{Database, Registry};

/// Opens the database described by `settings.database` and binds `registry`
/// to it.
///
/// A lazy configuration defers opening the file until the first statement.
///
/// # Errors
///
/// `OperationalError` if an eager connection cannot be opened, and
/// `ImproperlyConfigured` if the registry has unresolved references.
#[cfg(feature = "sqlite")]
pub fn connect(settings: &Settings, registry: Registry) -> MacaronResult<Database> {
    use macaron_db_backends::SqliteBackend;

    let config = &settings.database;
    tracing::info!(
        database = %config.name,
        lazy = config.lazy,
        autocommit = config.autocommit,
        "connecting"
    );
    if config.lazy {
        Database::open(
            SqliteBackend::open_lazy(&config.name, config.foreign_keys),
            registry,
            config.autocommit,
        )
    } else {
        Database::open(
            SqliteBackend::open(&config.name, config.foreign_keys)?,
            registry,
            config.autocommit,
        )
    }
}

/// Installs logging from `settings`, then calls [`connect`].
#[cfg(feature = "sqlite")]
pub fn setup(settings: &Settings, registry: Registry) -> MacaronResult<Database> {
    macaron_core::logging::setup_logging(settings);
    connect(settings, registry)
}
