//! Relationship collections.
//!
//! [`ReverseSet`] is the many side of a many-to-one relation seen from the
//! referenced record; [`ManyToManySet`] is one side of a many-to-many
//! relation. Both dereference to a [`QuerySet`] scoped to the related
//! records, so they can be filtered, counted and iterated like any query.

use std::ops::{Deref, DerefMut};

use macaron_core::{MacaronError, MacaronResult};

use crate::database::Database;
use crate::model::{Link, Relation};
use crate::query::compiler::quote;
use crate::query::QuerySet;
use crate::record::Record;
use crate::value::Value;

/// The records referencing one owner through a many-to-one relation.
#[derive(Debug, Clone)]
pub struct ReverseSet {
    db: Database,
    relation: Relation,
    owner_key: Value,
    records: QuerySet<Record>,
}

impl ReverseSet {
    pub(crate) fn new(owner: &Record, relation: Relation) -> MacaronResult<Self> {
        let db = owner.database().clone();
        let owner_key = owner.get(&relation.local_column)?.clone();
        let records = db
            .objects(&relation.target)?
            .all()
            .filter([(relation.remote_column.as_str(), owner_key.clone())])?;
        Ok(Self {
            db,
            relation,
            owner_key,
            records,
        })
    }

    /// Creates a related record bound to the owner.
    pub fn append<I, K, V>(&self, fields: I) -> MacaronResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut pairs: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        pairs.retain(|(k, _)| k != &self.relation.remote_column && k != &self.relation.counterpart);
        pairs.push((self.relation.remote_column.clone(), self.owner_key.clone()));
        self.db.objects(&self.relation.target)?.create(pairs)
    }
}

impl Deref for ReverseSet {
    type Target = QuerySet<Record>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl DerefMut for ReverseSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.records
    }
}

/// The records linked to one owner through a many-to-many relation.
#[derive(Debug, Clone)]
pub struct ManyToManySet {
    db: Database,
    relation: Relation,
    link: Link,
    owner_key: Value,
    records: QuerySet<Record>,
}

impl ManyToManySet {
    pub(crate) fn new(owner: &Record, relation: Relation) -> MacaronResult<Self> {
        let db = owner.database().clone();
        let link = relation.link.clone().ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!(
                "{}.{} has no link table",
                owner.model_name(),
                relation.name
            ))
        })?;
        let owner_key = owner.get(&relation.local_column)?.clone();
        let back = format!("{}__{}", relation.counterpart, relation.local_column);
        let records = db
            .objects(&relation.target)?
            .all()
            .filter([(back.as_str(), owner_key.clone())])?;
        Ok(Self {
            db,
            relation,
            link,
            owner_key,
            records,
        })
    }

    /// Links `target` to the owner. `extra` fills additional columns of an
    /// explicit link model. Linking the same pair twice stores two rows.
    pub fn append<I, K, V>(&self, target: &Record, extra: I) -> MacaronResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.check_target(target)?;
        let mut pairs: Vec<(String, Value)> = vec![
            (self.link.source_column.clone(), self.owner_key.clone()),
            (
                self.link.target_column.clone(),
                target.get(&self.relation.remote_column)?.clone(),
            ),
        ];
        pairs.extend(
            extra
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.into())),
        );
        self.db.objects(&self.link.model)?.create(pairs)
    }

    fn check_target(&self, target: &Record) -> MacaronResult<()> {
        if target.model_name() == self.relation.target {
            return Ok(());
        }
        Err(MacaronError::TypeError(format!(
            "{} expects a {} record, not {}",
            self.relation.name,
            self.relation.target,
            target.model_name()
        )))
    }

    /// Removes every link row of the owner.
    pub fn clear(&self) -> MacaronResult<usize> {
        self.pop(None)
    }

    /// Removes the link rows between the owner and `target`, or every link
    /// row of the owner when `target` is `None`.
    pub fn pop(&self, target: Option<&Record>) -> MacaronResult<usize> {
        let mut sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(&self.link.table),
            quote(&self.link.source_column)
        );
        let mut params = vec![self.owner_key.clone()];
        if let Some(target) = target {
            self.check_target(target)?;
            sql.push_str(&format!(" AND {} = ?", quote(&self.link.target_column)));
            params.push(target.get(&self.relation.remote_column)?.clone());
        }
        self.db.execute(&sql, &params)
    }
}

impl Deref for ManyToManySet {
    type Target = QuerySet<Record>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl DerefMut for ManyToManySet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.records
    }
}
