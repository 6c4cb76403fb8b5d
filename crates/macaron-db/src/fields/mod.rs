//! Field descriptors for the ORM.
//!
//! This module provides the [`FieldDef`] struct and [`FieldKind`] enum that
//! describe record fields and their column mappings, the [`FieldConverter`]
//! hook for custom fields, and the text formats used for temporal values.

pub mod converters;
pub mod temporal;
pub mod types;

pub use converters::{FieldConverter, JsonConverter};
pub use types::{AutoNow, FieldDef, FieldKind};
