//! Query building, compilation, and execution.
//!
//! - [`lookups`] - keyword suffix operators and the filter argument type
//! - [`paths`] - relationship path resolution into joins
//! - [`compiler`] - clause state and SQL layout
//! - [`queryset`] - the lazy, cached [`QuerySet`]

pub mod compiler;
pub mod lookups;
pub mod paths;
pub mod queryset;

pub use compiler::{Join, Query};
pub use lookups::{Arg, Lookup};
pub use queryset::{FromRow, Iter, QuerySet};
