//! # macaron-core
//!
//! Core types for macaron: the error taxonomy, settings, and logging setup.
//! This crate has no ORM dependencies and is shared by every other crate in
//! the workspace.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Settings with defaults for the database connection
//! - [`settings_loader`] - Loading settings from TOML/JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{MacaronError, MacaronResult, ValidationError};
pub use settings::{DatabaseSettings, Settings};
