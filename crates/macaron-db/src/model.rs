//! Model definitions for the ORM.
//!
//! A [`ModelDef`] describes one record type: its table, its ordered fields,
//! its relationships, and its table-level options. Definitions are built with
//! [`ModelDef::builder`] and handed to a [`Registry`](crate::registry::Registry),
//! which resolves relationships by target name and generates the reverse
//! accessors and many-to-many link types.
//!
//! ```
//! use macaron_db::fields::FieldDef;
//! use macaron_db::model::{ManyToOne, ModelDef, ReferentialAction};
//!
//! let member = ModelDef::builder("Member")
//!     .many_to_one(
//!         ManyToOne::new("team", "Team")
//!             .nullable()
//!             .related_name("members")
//!             .on_delete(ReferentialAction::SetNull),
//!     )
//!     .field(FieldDef::char("first_name").max_length(20))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(member.table(), "member");
//! let columns: Vec<_> = member.fields().iter().map(|f| f.column.as_str()).collect();
//! assert_eq!(columns, ["id", "team_id", "first_name"]);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult};

use crate::fields::FieldDef;
use crate::record::Record;

/// Referential action for `ON DELETE` / `ON UPDATE` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    /// Propagate the change to referencing rows.
    Cascade,
    /// Set the referencing key to NULL.
    SetNull,
    /// Set the referencing key to its column default.
    SetDefault,
    /// Refuse the change while referencing rows exist.
    Restrict,
    /// Take no action (checked at statement end).
    NoAction,
}

impl ReferentialAction {
    /// The SQL spelling of this action.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// A many-to-one relationship declaration.
///
/// The owner stores the referenced key in its own column, `<name>_id` by
/// default.
#[derive(Debug, Clone)]
pub struct ManyToOne {
    /// Accessor name on the owner.
    pub name: String,
    /// Name of the referenced model.
    pub target: String,
    /// Foreign-key column on the owner's table.
    pub column: String,
    /// Referenced column; the target's primary key when `None`.
    pub ref_key: Option<String>,
    /// `ON DELETE` action.
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    pub on_update: Option<ReferentialAction>,
    /// Whether the foreign key may be NULL.
    pub null: bool,
    /// Accessor name generated on the target; `<owner>_set` when `None`.
    pub related_name: Option<String>,
}

impl ManyToOne {
    /// Declares a relation named `name` to the model named `target`.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: format!("{name}_id"),
            name,
            target: target.into(),
            ref_key: None,
            on_delete: None,
            on_update: None,
            null: false,
            related_name: None,
        }
    }

    /// Overrides the foreign-key column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// References a column other than the target's primary key.
    #[must_use]
    pub fn ref_key(mut self, key: impl Into<String>) -> Self {
        self.ref_key = Some(key.into());
        self
    }

    /// Sets the `ON DELETE` action.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the `ON UPDATE` action.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Allows a NULL foreign key.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Names the reverse accessor generated on the target.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    fn key_field(&self) -> FieldDef {
        FieldDef::integer(self.column.clone()).null(self.null)
    }
}

/// A many-to-many relationship declaration.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    /// Accessor name on the owner.
    pub name: String,
    /// Name of the related model.
    pub target: String,
    /// Explicit link model; `<Owner><Target>Link` is generated when `None`.
    pub through: Option<String>,
    /// Accessor name generated on the target; `<owner>_set` when `None`.
    pub related_name: Option<String>,
}

impl ManyToMany {
    /// Declares a relation named `name` to the model named `target`.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            through: None,
            related_name: None,
        }
    }

    /// Uses an explicitly declared link model.
    #[must_use]
    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }

    /// Names the accessor generated on the target.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }
}

/// The shape of a resolved relationship, seen from the model that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This model stores the key of one target record.
    ManyToOne,
    /// Target records store this model's key (reverse of many-to-one).
    OneToMany,
    /// Records are paired through a link table.
    ManyToMany,
}

/// The link table behind a many-to-many relation.
#[derive(Debug, Clone)]
pub struct Link {
    /// Name of the link model.
    pub model: String,
    /// Table of the link model.
    pub table: String,
    /// Link column holding this side's key.
    pub source_column: String,
    /// Link column holding the other side's key.
    pub target_column: String,
}

/// A relationship after registry resolution.
///
/// Joining from this model to the target always has the shape
/// `ON "<this>"."<local_column>" = "<target>"."<remote_column>"`, with the
/// link table spliced in between for many-to-many relations.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Accessor name on this model.
    pub name: String,
    /// Relation shape.
    pub kind: RelationKind,
    /// Name of the model on the other side.
    pub target: String,
    /// Table of the model on the other side.
    pub target_table: String,
    /// Column on this model's table.
    pub local_column: String,
    /// Column on the target's table.
    pub remote_column: String,
    /// Link table for many-to-many relations.
    pub link: Option<Link>,
    /// Accessor name of the same relation on the other side.
    pub counterpart: String,
}

/// Per-model lifecycle hooks.
///
/// All methods have default no-op implementations, so you only need to
/// override the hooks you care about. Returning `Err` from a `before_*` hook
/// aborts the operation before any SQL runs.
pub trait ModelHooks: Send + Sync {
    /// Called after defaults, supplied values and auto values are applied,
    /// before validation.
    fn before_create(&self, _record: &mut Record) -> MacaronResult<()> {
        Ok(())
    }

    /// Called after the INSERT and refetch.
    fn after_create(&self, _record: &mut Record) -> MacaronResult<()> {
        Ok(())
    }

    /// Called after auto values are applied, before validation.
    fn before_save(&self, _record: &mut Record) -> MacaronResult<()> {
        Ok(())
    }

    /// Called after the UPDATE and refetch.
    fn after_save(&self, _record: &mut Record) -> MacaronResult<()> {
        Ok(())
    }

    /// Called before the DELETE.
    fn before_delete(&self, _record: &Record) -> MacaronResult<()> {
        Ok(())
    }

    /// Called after the DELETE.
    fn after_delete(&self, _record: &Record) -> MacaronResult<()> {
        Ok(())
    }
}

/// The definition of one record type.
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) many_to_one: Vec<ManyToOne>,
    pub(crate) many_to_many: Vec<ManyToMany>,
    pub(crate) unique_together: Vec<Vec<String>>,
    pub(crate) ordering: Vec<String>,
    pub(crate) hooks: Option<Arc<dyn ModelHooks>>,
    pub(crate) relations: Vec<Relation>,
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("ordering", &self.ordering)
            .finish_non_exhaustive()
    }
}

impl ModelDef {
    /// Starts a definition for the model named `name`.
    pub fn builder(name: impl Into<String>) -> ModelDefBuilder {
        ModelDefBuilder::new(name.into())
    }

    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order, foreign-key columns included.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by name or column.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    /// The primary-key field.
    pub fn pk(&self) -> &FieldDef {
        // `build` guarantees exactly one primary key.
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .unwrap_or(&self.fields[0])
    }

    /// Declared many-to-one relations.
    pub fn many_to_one(&self) -> &[ManyToOne] {
        &self.many_to_one
    }

    /// Declared many-to-many relations.
    pub fn many_to_many(&self) -> &[ManyToMany] {
        &self.many_to_many
    }

    /// Column groups that must be unique together.
    pub fn unique_together(&self) -> &[Vec<String>] {
        &self.unique_together
    }

    /// Default ordering terms (`"-id"` for descending).
    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    /// Lifecycle hooks, if any.
    pub fn hooks(&self) -> Option<&Arc<dyn ModelHooks>> {
        self.hooks.as_ref()
    }

    /// Resolved relations, forward and reverse.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Looks up a resolved relation by accessor name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub(crate) fn add_relation(&mut self, relation: Relation) -> MacaronResult<()> {
        if self.relation(&relation.name).is_some()
            || self.fields.iter().any(|f| f.name == relation.name)
        {
            return Err(MacaronError::ImproperlyConfigured(format!(
                "{} already has an attribute named '{}'",
                self.name, relation.name
            )));
        }
        self.relations.push(relation);
        Ok(())
    }
}

/// Builder for [`ModelDef`].
pub struct ModelDefBuilder {
    name: String,
    table: Option<String>,
    fields: Vec<FieldDef>,
    many_to_one: Vec<ManyToOne>,
    many_to_many: Vec<ManyToMany>,
    unique_together: Vec<Vec<String>>,
    ordering: Vec<String>,
    hooks: Option<Arc<dyn ModelHooks>>,
}

impl ModelDefBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            table: None,
            fields: Vec::new(),
            many_to_one: Vec::new(),
            many_to_many: Vec::new(),
            unique_together: Vec::new(),
            ordering: Vec::new(),
            hooks: None,
        }
    }

    /// Overrides the table name (default: the lower-cased model name).
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a many-to-one relation and its foreign-key column.
    #[must_use]
    pub fn many_to_one(mut self, relation: ManyToOne) -> Self {
        self.fields.push(relation.key_field());
        self.many_to_one.push(relation);
        self
    }

    /// Appends a many-to-many relation.
    #[must_use]
    pub fn many_to_many(mut self, relation: ManyToMany) -> Self {
        self.many_to_many.push(relation);
        self
    }

    /// Adds a `UNIQUE (...)` constraint over the given field names.
    #[must_use]
    pub fn unique_together<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the default ordering (`"-name"` for descending).
    #[must_use]
    pub fn ordering<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Finishes the definition.
    ///
    /// A nullable surrogate key `id` is inserted as the first field when no
    /// primary key was declared.
    pub fn build(self) -> MacaronResult<ModelDef> {
        let mut fields = self.fields;

        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) || (f.name != f.column && !seen.insert(f.column.as_str())) {
                return Err(MacaronError::ImproperlyConfigured(format!(
                    "{}: duplicate field '{}'",
                    self.name, f.name
                )));
            }
        }

        match fields.iter().filter(|f| f.primary_key).count() {
            0 => {
                if fields.iter().any(|f| f.column == "id") {
                    return Err(MacaronError::ImproperlyConfigured(format!(
                        "{}: field 'id' must be the primary key when no other key is declared",
                        self.name
                    )));
                }
                fields.insert(0, FieldDef::serial("id"));
            }
            1 => {}
            _ => {
                return Err(MacaronError::ImproperlyConfigured(format!(
                    "{}: more than one primary key declared",
                    self.name
                )));
            }
        }

        for group in &self.unique_together {
            if let Some(missing) = group
                .iter()
                .find(|name| !fields.iter().any(|f| &f.name == *name || &f.column == *name))
            {
                return Err(MacaronError::ImproperlyConfigured(format!(
                    "{}: unique_together names unknown field '{missing}'",
                    self.name
                )));
            }
        }

        Ok(ModelDef {
            table: self.table.unwrap_or_else(|| self.name.to_lowercase()),
            name: self.name,
            fields,
            many_to_one: self.many_to_one,
            many_to_many: self.many_to_many,
            unique_together: self.unique_together,
            ordering: self.ordering,
            hooks: self.hooks,
            relations: Vec::new(),
        })
    }
}
