//! Records: one row of a model, held in object form.
//!
//! Every assignment goes through [`Record::set`], which casts and validates
//! the value against its field descriptor, so a record never holds a value
//! its descriptor would reject.

use std::fmt;
use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult, ValidationError};

use crate::database::Database;
use crate::executor::Row;
use crate::model::{Relation, RelationKind};
use crate::persistence;
use crate::query::lookups::Arg;
use crate::related::{ManyToManySet, ReverseSet};
use crate::schema::TableMeta;
use crate::value::{FromValue, Value};

/// A record of some registered model.
#[derive(Clone)]
pub struct Record {
    db: Database,
    meta: Arc<TableMeta>,
    values: Vec<Value>,
    original_pk: Option<Value>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.meta.name());
        for (field, value) in self.meta.fields().iter().zip(&self.values) {
            s.field(&field.name, value);
        }
        s.finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.meta.name() == other.meta.name() && self.values == other.values
    }
}

impl Record {
    /// A record holding every field's initial value; not yet stored.
    pub(crate) fn new(db: Database, meta: Arc<TableMeta>) -> Self {
        let values = meta.fields().iter().map(|f| f.initial_value()).collect();
        Self {
            db,
            meta,
            values,
            original_pk: None,
        }
    }

    /// Builds a record from a fetched row.
    pub(crate) fn hydrate(db: Database, meta: Arc<TableMeta>, row: &Row) -> MacaronResult<Self> {
        let values = meta.row_values(row)?;
        let original_pk = Some(values[meta.pk_index()].clone());
        Ok(Self {
            db,
            meta,
            values,
            original_pk,
        })
    }

    /// The model name.
    pub fn model_name(&self) -> &str {
        self.meta.name()
    }

    /// The resolved table description.
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// The database this record belongs to.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The primary-key value.
    pub fn pk(&self) -> &Value {
        &self.values[self.meta.pk_index()]
    }

    pub(crate) fn original_pk(&self) -> Option<&Value> {
        self.original_pk.as_ref()
    }

    /// `(field name, value)` pairs in column order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.meta
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .zip(&self.values)
    }

    pub(crate) fn raw_values(&self) -> &[Value] {
        &self.values
    }

    /// Replaces every value with what the database holds, as after a refetch.
    pub(crate) fn load_from(&mut self, stored: Self) {
        self.original_pk = stored.original_pk;
        self.values = stored.values;
    }

    fn index(&self, name: &str) -> MacaronResult<usize> {
        if let Some(i) = self.meta.position(name) {
            return Ok(i);
        }
        self.meta
            .model()
            .relation(name)
            .filter(|r| r.kind == RelationKind::ManyToOne)
            .and_then(|r| self.meta.position(&r.local_column))
            .ok_or_else(|| {
                MacaronError::ImproperlyConfigured(format!(
                    "{} has no field '{name}'",
                    self.meta.name()
                ))
            })
    }

    /// The value of a field, by name or column. A many-to-one relation name
    /// gives its key column.
    pub fn get(&self, name: &str) -> MacaronResult<&Value> {
        Ok(&self.values[self.index(name)?])
    }

    /// The value of a field converted to a Rust type.
    pub fn get_as<T: FromValue>(&self, name: &str) -> MacaronResult<T> {
        T::from_value(self.get(name)?)
    }

    pub(crate) fn qualify(&self, err: MacaronError) -> MacaronError {
        match err {
            MacaronError::ValidationError(ve) => {
                let mut qualified = ValidationError::new(
                    format!("{}.{}", self.meta.name(), ve.message),
                    ve.code.clone(),
                );
                qualified.params = ve.params;
                MacaronError::ValidationError(qualified)
            }
            other => other,
        }
    }

    /// Casts, validates, and stores a value.
    ///
    /// # Errors
    ///
    /// A validation error, prefixed with the model name, when the descriptor
    /// rejects the value. The stored value is unchanged in that case.
    ///
    /// `TypeError` when `name` is a many-to-one relation: a bare value cannot
    /// be checked against the referenced model, so assign a record with
    /// [`set_related`](Self::set_related) or the key through its column.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> MacaronResult<()> {
        if self.meta.position(name).is_none() {
            if let Some(rel) = self
                .meta
                .model()
                .relation(name)
                .filter(|r| r.kind == RelationKind::ManyToOne)
            {
                return Err(MacaronError::TypeError(format!(
                    "{}.{name} takes a {} record; use set_related or assign '{}'",
                    self.meta.name(),
                    rel.target,
                    rel.local_column
                )));
            }
        }
        let i = self.index(name)?;
        let field = &self.meta.fields()[i];
        let value = field.cast(value.into()).map_err(|e| self.qualify(e))?;
        field.validate(&value).map_err(|e| self.qualify(e))?;
        self.values[i] = value;
        Ok(())
    }

    /// Validates every stored value.
    pub fn validate(&self) -> MacaronResult<()> {
        for (field, value) in self.meta.fields().iter().zip(&self.values) {
            if value.is_null() && field.is_auto_key() {
                continue;
            }
            field.validate(value).map_err(|e| self.qualify(e))?;
        }
        Ok(())
    }

    /// Writes the record's current values back to its row.
    pub fn save(&mut self) -> MacaronResult<()> {
        persistence::save(self)
    }

    /// Deletes the record's row.
    pub fn delete(&self) -> MacaronResult<usize> {
        persistence::delete(self)
    }

    /// Reloads every value from the database.
    pub fn refresh(&mut self) -> MacaronResult<()> {
        persistence::refresh(self)
    }

    fn relation(&self, name: &str, kind: RelationKind) -> MacaronResult<Relation> {
        self.meta
            .model()
            .relation(name)
            .filter(|r| r.kind == kind)
            .cloned()
            .ok_or_else(|| {
                MacaronError::ImproperlyConfigured(format!(
                    "{} has no {kind:?} relation '{name}'",
                    self.meta.name()
                ))
            })
    }

    /// The record a many-to-one relation points at; `None` without a query
    /// when the key is null.
    pub fn get_related(&self, name: &str) -> MacaronResult<Option<Self>> {
        let rel = self.relation(name, RelationKind::ManyToOne)?;
        let key = self.get(&rel.local_column)?;
        if key.is_null() {
            return Ok(None);
        }
        let objects = self.db.objects(&rel.target)?;
        objects
            .all()
            .get([(rel.remote_column.as_str(), Arg::Value(key.clone()))])
            .map(Some)
    }

    /// Points a many-to-one relation at `target`, or clears it.
    ///
    /// # Errors
    ///
    /// `TypeError` when `target` is not a record of the referenced model.
    pub fn set_related(&mut self, name: &str, target: Option<&Self>) -> MacaronResult<()> {
        let rel = self.relation(name, RelationKind::ManyToOne)?;
        let key = match target {
            None => Value::Null,
            Some(target) if target.model_name() == rel.target => {
                target.get(&rel.remote_column)?.clone()
            }
            Some(target) => {
                return Err(MacaronError::TypeError(format!(
                    "{}.{name} must be a {} record, not {}",
                    self.meta.name(),
                    rel.target,
                    target.model_name()
                )));
            }
        };
        self.set(&rel.local_column, key)
    }

    /// The records whose many-to-one relation points at this one.
    pub fn reverse(&self, name: &str) -> MacaronResult<ReverseSet> {
        let rel = self.relation(name, RelationKind::OneToMany)?;
        ReverseSet::new(self, rel)
    }

    /// The records linked to this one through a many-to-many relation.
    pub fn many_to_many(&self, name: &str) -> MacaronResult<ManyToManySet> {
        let rel = self.relation(name, RelationKind::ManyToMany)?;
        ManyToManySet::new(self, rel)
    }
}
