//! # macaron-db
//!
//! ORM layer for macaron. Models are described with [`ModelDef`] builders and
//! registered in a [`Registry`], which wires up relationships by name. A
//! [`Database`] binds each model to its live table on first use and hands
//! out [`Manager`]s, lazy [`QuerySet`]s and [`Record`]s.
//!
//! ## Architecture
//!
//! A [`QuerySet`] accumulates clauses through `&self` builder methods without
//! touching the database. Relationship paths such as `mygroup__series__name`
//! are resolved into `INNER JOIN`s aliased by the dotted path. SQL is only
//! run when the set is iterated, indexed, counted or deleted. Writes go
//! through [`Record`]: every assignment is cast and validated by the field's
//! descriptor, and create/save refetch the row afterwards.
//!
//! ## Module Overview
//!
//! - [`value`] - The [`Value`] enum and [`FromValue`] conversions
//! - [`fields`] - Field descriptors ([`FieldDef`]) and custom converters
//! - [`validators`] - Field validators
//! - [`model`] - Model definitions and relationship declarations
//! - [`registry`] - Model registration and relationship wiring
//! - [`schema`] - Table reflection and `CREATE TABLE` generation
//! - [`query`] - Lookups, path resolution, compilation and query sets
//! - [`record`], [`related`], [`persistence`], [`manager`] - Working with rows
//! - [`database`], [`executor`], [`transactions`] - Connection handling

// These clippy lints are intentionally allowed for the ORM crate:
// - struct_excessive_bools: FieldDef carries one flag per column attribute
// - cast_precision_loss: i64-to-f64 casts are acceptable for validator comparisons
// - result_large_err: MacaronError is the workspace error type and is used consistently
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: conversions take values by value on purpose
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]

pub mod database;
pub mod executor;
pub mod fields;
pub mod manager;
pub mod model;
pub mod persistence;
pub mod query;
pub mod record;
pub mod registry;
pub mod related;
pub mod schema;
pub mod transactions;
pub mod validators;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use database::Database;
pub use executor::{ColumnInfo, DbExecutor, Row};
pub use fields::{AutoNow, FieldConverter, FieldDef, FieldKind, JsonConverter};
pub use manager::Manager;
pub use model::{
    Link, ManyToMany, ManyToOne, ModelDef, ModelDefBuilder, ModelHooks, ReferentialAction,
    Relation, RelationKind,
};
pub use query::{Arg, Lookup, QuerySet};
pub use record::Record;
pub use registry::Registry;
pub use related::{ManyToManySet, ReverseSet};
pub use schema::TableMeta;
pub use transactions::atomic;
pub use validators::Validator;
pub use value::{FromValue, Value};

/// Builds a `Vec<(&str, Value)>` of keyword arguments.
///
/// ```
/// use macaron_db::{kwargs, Value};
///
/// let args = kwargs! { "name" => "Max Heart", "age" => 16 };
/// assert_eq!(args[1], ("age", Value::Int(16)));
/// ```
#[macro_export]
macro_rules! kwargs {
    () => {
        ::std::vec::Vec::<(&str, $crate::value::Value)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        vec![$(($key, $crate::value::Value::from($value))),+]
    };
}
