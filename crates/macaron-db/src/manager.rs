//! Model-level entry point for queries and creation.

use std::sync::Arc;

use macaron_core::MacaronResult;

use crate::database::Database;
use crate::persistence;
use crate::query::{Arg, QuerySet};
use crate::record::Record;
use crate::schema::TableMeta;
use crate::value::Value;

/// Access to the records of one model, obtained from
/// [`Database::objects`](crate::database::Database::objects).
#[derive(Debug, Clone)]
pub struct Manager {
    db: Database,
    meta: Arc<TableMeta>,
}

impl Manager {
    pub(crate) const fn new(db: Database, meta: Arc<TableMeta>) -> Self {
        Self { db, meta }
    }

    /// The resolved table description.
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// Every record, in the model's default ordering.
    pub fn all(&self) -> QuerySet<Record> {
        let set = QuerySet::new(self.db.clone(), Arc::clone(&self.meta));
        let ordering = self.meta.model().ordering();
        if ordering.is_empty() {
            return set;
        }
        match set.order_by(ordering) {
            Ok(ordered) => ordered,
            Err(err) => {
                tracing::warn!(model = self.meta.name(), error = %err, "ignoring default ordering");
                set
            }
        }
    }

    /// Creates and stores a record.
    pub fn create<I, K, V>(&self, fields: I) -> MacaronResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        persistence::create(&self.db, &self.meta, fields)
    }

    /// See [`QuerySet::filter`].
    pub fn filter<I, K, V>(&self, pairs: I) -> MacaronResult<QuerySet<Record>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        self.all().filter(pairs)
    }

    /// See [`QuerySet::exclude`].
    pub fn exclude<I, K, V>(&self, pairs: I) -> MacaronResult<QuerySet<Record>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        self.all().exclude(pairs)
    }

    /// See [`QuerySet::select`].
    pub fn select<P>(&self, condition: &str, params: P) -> QuerySet<Record>
    where
        P: IntoIterator,
        P::Item: Into<Value>,
    {
        self.all().select(condition, params)
    }

    /// See [`QuerySet::get`].
    pub fn get<I, K, V>(&self, pairs: I) -> MacaronResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        self.all().get(pairs)
    }

    /// The record with primary key `key`.
    pub fn get_by_pk(&self, key: impl Into<Value>) -> MacaronResult<Record> {
        self.all().get_by_pk(key)
    }

    /// Number of stored records.
    pub fn count(&self) -> MacaronResult<i64> {
        self.all().count()
    }
}
