//! The connection handle.
//!
//! A [`Database`] owns one executor and the model registry, and caches each
//! model's [`TableMeta`] the first time it is needed. Handles are cheap to
//! clone; records and query sets carry one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use macaron_core::MacaronResult;

use crate::executor::{DbExecutor, Row};
use crate::manager::Manager;
use crate::registry::Registry;
use crate::schema::{self, TableMeta};
use crate::value::Value;

struct Inner {
    executor: Box<dyn DbExecutor>,
    registry: Registry,
    metas: Mutex<HashMap<String, Arc<TableMeta>>>,
    autocommit: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.autocommit && self.executor.is_open() {
            if let Err(err) = self.executor.commit() {
                tracing::error!(error = %err, "commit on drop failed");
            }
        }
    }
}

/// A shared handle to one database connection and its models.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("open", &self.inner.executor.is_open())
            .field("autocommit", &self.inner.autocommit)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Wraps an executor.
    ///
    /// # Errors
    ///
    /// `ImproperlyConfigured` if the registry still has unresolved model
    /// references.
    pub fn open(
        executor: impl DbExecutor + 'static,
        registry: Registry,
        autocommit: bool,
    ) -> MacaronResult<Self> {
        registry.check()?;
        Ok(Self {
            inner: Arc::new(Inner {
                executor: Box::new(executor),
                registry,
                metas: Mutex::new(HashMap::new()),
                autocommit,
            }),
        })
    }

    /// The model registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    fn executor(&self) -> &dyn DbExecutor {
        self.inner.executor.as_ref()
    }

    fn cache(&self, meta: TableMeta) -> Arc<TableMeta> {
        let meta = Arc::new(meta);
        self.inner
            .metas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(meta.name().to_string(), Arc::clone(&meta));
        meta
    }

    /// The resolved description of `model`, reflected from its table on
    /// first use.
    pub fn meta(&self, model: &str) -> MacaronResult<Arc<TableMeta>> {
        if let Some(meta) = self
            .inner
            .metas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
        {
            return Ok(Arc::clone(meta));
        }
        let def = self.inner.registry.get(model)?;
        let meta = schema::load(self.executor(), def)?;
        tracing::debug!(model, table = def.table(), "bound model to table");
        Ok(self.cache(meta))
    }

    /// Creates the table of `model`.
    ///
    /// # Errors
    ///
    /// `TableAlreadyExists` when it is already present.
    pub fn create_table(&self, model: &str) -> MacaronResult<Arc<TableMeta>> {
        let def = self.inner.registry.get(model)?;
        let meta = schema::create_table(self.executor(), def)?;
        Ok(self.cache(meta))
    }

    /// Creates the generated link tables of `model`'s many-to-many relations.
    pub fn create_link_tables(&self, model: &str) -> MacaronResult<Vec<Arc<TableMeta>>> {
        let def = self.inner.registry.get(model)?;
        def.many_to_many()
            .iter()
            .filter(|m| m.through.is_none())
            .map(|m| {
                let link = self.inner.registry.link_model(model, &m.name)?;
                self.create_table(link.name())
            })
            .collect()
    }

    /// The manager of `model`.
    pub fn objects(&self, model: &str) -> MacaronResult<Manager> {
        Ok(Manager::new(self.clone(), self.meta(model)?))
    }

    /// Runs a statement, returning the number of affected rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> MacaronResult<usize> {
        self.executor().execute(sql, params)
    }

    /// Runs an INSERT, returning the assigned row id.
    pub fn insert(&self, sql: &str, params: &[Value]) -> MacaronResult<i64> {
        self.executor().insert(sql, params)
    }

    /// Runs a query.
    pub fn query(&self, sql: &str, params: &[Value]) -> MacaronResult<Vec<Row>> {
        self.executor().query(sql, params)
    }

    /// Commits the open transaction.
    pub fn commit(&self) -> MacaronResult<()> {
        self.executor().commit()
    }

    /// Rolls back the open transaction.
    pub fn rollback(&self) -> MacaronResult<()> {
        self.executor().rollback()
    }

    /// The executor's label, used in logs.
    pub fn name(&self) -> &str {
        self.executor().name()
    }

    /// Whether commit happens automatically on close.
    pub fn autocommit(&self) -> bool {
        self.inner.autocommit
    }

    /// Returns `true` until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.executor().is_open()
    }

    /// Closes the connection, committing first in autocommit mode, and
    /// drops every cached table description.
    pub fn close(&self) -> MacaronResult<()> {
        if self.inner.autocommit && self.is_open() {
            self.commit()?;
        }
        self.executor().close()?;
        self.inner
            .metas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
