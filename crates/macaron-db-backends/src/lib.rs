//! # macaron-db-backends
//!
//! Database backend implementations for macaron. Each backend implements
//! [`DbExecutor`](macaron_db::DbExecutor) over one connection.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, on by default), with an eager and a lazy
//!   connection variant

#![allow(clippy::significant_drop_tightening)]

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
