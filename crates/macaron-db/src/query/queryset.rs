//! Lazy query sets.
//!
//! A [`QuerySet`] accumulates clauses without touching the database. Builder
//! methods take `&self` and return a new query set, so a base query can be
//! refined in several directions. Rows are fetched when the set is first
//! iterated or indexed, converted one at a time, and cached in order; calling
//! [`iter`](QuerySet::iter) again re-executes the query from scratch.

use std::fmt;
use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult};

use super::compiler::{qualified, Query};
use super::lookups::{split_lookup, Arg};
use super::paths::{self, Resolved};
use crate::database::Database;
use crate::executor::Row;
use crate::fields::FieldDef;
use crate::record::Record;
use crate::schema::TableMeta;
use crate::value::{FromValue, Value};

/// Converts a result row into the item type of a [`QuerySet`].
pub trait FromRow: Sized + Clone {
    /// Builds one item. `fields` describes the selected columns in order.
    fn from_row(
        db: &Database,
        meta: &Arc<TableMeta>,
        fields: &[FieldDef],
        row: &Row,
    ) -> MacaronResult<Self>;
}

impl FromRow for Record {
    fn from_row(
        db: &Database,
        meta: &Arc<TableMeta>,
        _fields: &[FieldDef],
        row: &Row,
    ) -> MacaronResult<Self> {
        Record::hydrate(db.clone(), Arc::clone(meta), row)
    }
}

impl FromRow for Vec<Value> {
    fn from_row(
        _db: &Database,
        _meta: &Arc<TableMeta>,
        fields: &[FieldDef],
        row: &Row,
    ) -> MacaronResult<Self> {
        fields
            .iter()
            .zip(row.values())
            .map(|(f, v)| f.to_object(v.clone()))
            .collect()
    }
}

impl FromRow for Value {
    fn from_row(
        _db: &Database,
        _meta: &Arc<TableMeta>,
        fields: &[FieldDef],
        row: &Row,
    ) -> MacaronResult<Self> {
        let raw = row.values().first().cloned().unwrap_or(Value::Null);
        match fields.first() {
            Some(f) => f.to_object(raw),
            None => Ok(raw),
        }
    }
}

/// A lazily evaluated, cached query over one model.
pub struct QuerySet<T = Record> {
    db: Database,
    meta: Arc<TableMeta>,
    query: Query,
    fields: Vec<FieldDef>,
    cache: Vec<T>,
    cursor: Option<std::vec::IntoIter<Row>>,
}

impl<T> Clone for QuerySet<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            meta: Arc::clone(&self.meta),
            query: self.query.clone(),
            fields: self.fields.clone(),
            cache: Vec::new(),
            cursor: None,
        }
    }
}

impl<T> fmt::Debug for QuerySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.meta.name())
            .field("query", &self.query)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl QuerySet<Record> {
    /// A query over every row of the model.
    pub fn new(db: Database, meta: Arc<TableMeta>) -> Self {
        Self {
            query: Query::new(meta.table()),
            fields: meta.fields().to_vec(),
            db,
            meta,
            cache: Vec::new(),
            cursor: None,
        }
    }
}

impl<T> QuerySet<T> {
    /// The model this query selects from.
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// The clause set.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The SQL and parameters that would be executed.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.query.compile_select()
    }

    fn derive(&self, query: Query) -> Self {
        Self {
            db: self.db.clone(),
            meta: Arc::clone(&self.meta),
            query,
            fields: self.fields.clone(),
            cache: Vec::new(),
            cursor: None,
        }
    }

    fn reshape<U>(&self, query: Query, fields: Vec<FieldDef>) -> QuerySet<U> {
        QuerySet {
            db: self.db.clone(),
            meta: Arc::clone(&self.meta),
            query,
            fields,
            cache: Vec::new(),
            cursor: None,
        }
    }

    fn resolve(&self, query: &mut Query, path: &[&str]) -> MacaronResult<Resolved> {
        paths::resolve(&self.db, &self.meta, query, path)
    }

    fn conditions<I, K, V>(&self, pairs: I, negate: bool) -> MacaronResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        let mut query = self.query.clone();
        for (key, value) in pairs {
            let (path, lookup) = split_lookup(key.as_ref());
            let resolved = self.resolve(&mut query, &path)?;
            let mut params = Vec::new();
            let arg = resolved.bind(value.into())?;
            let cond = lookup.compile(&resolved.column, arg, &resolved.field, &mut params)?;
            query
                .wheres
                .push(if negate { format!("NOT ({cond})") } else { cond });
            query.params.extend(params);
        }
        Ok(self.derive(query))
    }

    /// Adds keyword conditions: `("age__lt", 18)`, `("mygroup__name", "x")`.
    ///
    /// Each condition becomes its own parenthesized WHERE fragment.
    pub fn filter<I, K, V>(&self, pairs: I) -> MacaronResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        self.conditions(pairs, false)
    }

    /// Like [`filter`](Self::filter) with each condition negated.
    pub fn exclude<I, K, V>(&self, pairs: I) -> MacaronResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        self.conditions(pairs, true)
    }

    /// Adds a raw WHERE fragment with `?` parameters.
    #[must_use]
    pub fn select<P>(&self, condition: &str, params: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<Value>,
    {
        let mut query = self.query.clone();
        query.wheres.push(condition.to_string());
        query.params.extend(params.into_iter().map(Into::into));
        self.derive(query)
    }

    /// Replaces the ordering. `"-field"` sorts descending; paths may cross
    /// relationships.
    pub fn order_by<I, S>(&self, terms: I) -> MacaronResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut query = self.query.clone();
        query.order_by.clear();
        for term in terms {
            let term = term.as_ref();
            let (name, descending) = term
                .strip_prefix('-')
                .map_or((term, false), |rest| (rest, true));
            let path: Vec<&str> = name.split("__").collect();
            let resolved = self.resolve(&mut query, &path)?;
            query.order_by.push(if descending {
                format!("{} DESC", resolved.column)
            } else {
                resolved.column
            });
        }
        Ok(self.derive(query))
    }

    /// Limits the number of rows.
    #[must_use]
    pub fn limit(&self, limit: i64) -> Self {
        let mut query = self.query.clone();
        query.limit = Some(limit);
        self.derive(query)
    }

    /// Skips rows.
    #[must_use]
    pub fn offset(&self, offset: i64) -> Self {
        let mut query = self.query.clone();
        query.offset = Some(offset);
        self.derive(query)
    }

    /// Half-open slice `[start, stop)`.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` when `stop < start`.
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>) -> MacaronResult<Self> {
        let start_at = start.unwrap_or(0);
        let mut query = self.query.clone();
        match stop {
            Some(stop) if stop < start_at => {
                return Err(MacaronError::InvalidQuery(format!(
                    "Slice stop {stop} is before start {start_at}"
                )));
            }
            Some(stop) => query.limit = Some(stop - start_at),
            None => query.limit = None,
        }
        query.offset = start;
        Ok(self.derive(query))
    }

    /// `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(&self) -> Self {
        let mut query = self.query.clone();
        query.distinct = true;
        self.derive(query)
    }

    fn select_paths<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> MacaronResult<(Query, Vec<FieldDef>)> {
        let mut query = self.query.clone();
        let mut fields = Vec::new();
        let mut columns = Vec::new();
        if names.is_empty() {
            for f in self.meta.fields() {
                columns.push(qualified(self.meta.table(), &f.column));
                fields.push(f.clone());
            }
        }
        for name in names {
            let path: Vec<&str> = name.as_ref().split("__").collect();
            let resolved = self.resolve(&mut query, &path)?;
            columns.push(resolved.column);
            fields.push(resolved.field);
        }
        query.select = columns;
        Ok((query, fields))
    }

    /// Yields tuples of the named columns instead of records. An empty list
    /// selects every column.
    pub fn values<S: AsRef<str>>(&self, names: &[S]) -> MacaronResult<QuerySet<Vec<Value>>> {
        let (query, fields) = self.select_paths(names)?;
        Ok(self.reshape(query, fields))
    }

    /// Yields a single column's values.
    pub fn scalar(&self, name: &str) -> MacaronResult<QuerySet<Value>> {
        let (query, fields) = self.select_paths(&[name])?;
        Ok(self.reshape(query, fields))
    }

    fn selected_field(&self, name: &str) -> MacaronResult<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
            .ok_or_else(|| {
                MacaronError::InvalidQuery(format!(
                    "'{name}' is not selected by this {} query",
                    self.meta.name()
                ))
            })
    }

    /// Runs `SELECT <func>(<column>) FROM (<query>)`.
    ///
    /// `column` must be one of the columns this query selects: any field of
    /// the model for a record query, or one of the named columns after
    /// [`values`](Self::values) / [`scalar`](Self::scalar). `None` aggregates
    /// `*`.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a column the query does not select.
    pub fn aggregate(&self, func: &str, column: Option<&str>) -> MacaronResult<Value> {
        let column = column
            .map(|name| self.selected_field(name).map(|f| f.column.clone()))
            .transpose()?;
        let (sql, params) = self.query.compile_aggregate(func, column.as_deref());
        let rows = self.db.query(&sql, &params)?;
        match rows.as_slice() {
            [] => Ok(Value::Null),
            [row] => row.get_by_index::<Value>(0),
            _ => Err(MacaronError::MultipleObjectsReturned(format!(
                "{func} returned {} rows",
                rows.len()
            ))),
        }
    }

    /// Number of rows the query matches.
    pub fn count(&self) -> MacaronResult<i64> {
        i64::from_value(&self.aggregate("COUNT", None)?)
    }

    /// `SUM` of a column; `Null` over no rows.
    pub fn sum(&self, column: &str) -> MacaronResult<Value> {
        self.aggregate("SUM", Some(column))
    }

    /// `AVG` of a column.
    pub fn avg(&self, column: &str) -> MacaronResult<Value> {
        self.aggregate("AVG", Some(column))
    }

    /// `MIN` of a column, converted to the field's object form.
    pub fn min(&self, column: &str) -> MacaronResult<Value> {
        self.extreme("MIN", column)
    }

    /// `MAX` of a column, converted to the field's object form.
    pub fn max(&self, column: &str) -> MacaronResult<Value> {
        self.extreme("MAX", column)
    }

    fn extreme(&self, func: &str, column: &str) -> MacaronResult<Value> {
        let raw = self.aggregate(func, Some(column))?;
        self.selected_field(column)?.to_object(raw)
    }

    /// Deletes every matched row, returning how many were removed.
    pub fn delete(&self) -> MacaronResult<usize> {
        let (sql, params) = self.query.compile_delete(&self.meta.pk().column);
        let deleted = self.db.execute(&sql, &params)?;
        tracing::debug!(model = self.meta.name(), deleted, "deleted rows");
        Ok(deleted)
    }
}

impl<T: FromRow> QuerySet<T> {
    fn execute(&mut self) -> MacaronResult<()> {
        let (sql, params) = self.query.compile_select();
        let rows = self.db.query(&sql, &params)?;
        self.cache.clear();
        self.cursor = Some(rows.into_iter());
        Ok(())
    }

    /// Converts the next row. A row that fails to convert drops the cursor,
    /// so the buffer never skips a position; the next access re-executes.
    fn advance(&mut self) -> Option<MacaronResult<T>> {
        let row = self.cursor.as_mut()?.next()?;
        let item = T::from_row(&self.db, &self.meta, &self.fields, &row);
        match &item {
            Ok(item) => self.cache.push(item.clone()),
            Err(_) => self.cursor = None,
        }
        Some(item)
    }

    /// Executes the query and iterates the converted rows.
    pub fn iter(&mut self) -> Iter<'_, T> {
        let failed = self.execute().err();
        Iter { set: self, failed }
    }

    /// The item at `index`, fetching only as far as needed.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` past the last row.
    pub fn at(&mut self, index: usize) -> MacaronResult<T> {
        if self.cursor.is_none() {
            self.execute()?;
        }
        while self.cache.len() <= index {
            match self.advance() {
                Some(item) => {
                    item?;
                }
                None => {
                    return Err(MacaronError::IndexOutOfRange {
                        index,
                        len: self.cache.len(),
                    });
                }
            }
        }
        Ok(self.cache[index].clone())
    }

    /// Executes the query and collects every item.
    pub fn fetch_all(&mut self) -> MacaronResult<Vec<T>> {
        self.iter().collect()
    }

    /// The first item, if any.
    pub fn first(&self) -> MacaronResult<Option<T>> {
        let mut query = self.query.clone();
        if query.limit.map_or(true, |l| l < 0 || l > 1) {
            query.limit = Some(1);
        }
        let mut set = self.derive(query);
        set.fetch_all().map(|items| items.into_iter().next())
    }

    /// The single item matching `pairs`.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` when nothing matches, `MultipleObjectsReturned` when
    /// more than one row does.
    pub fn get<I, K, V>(&self, pairs: I) -> MacaronResult<T>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arg>,
    {
        let mut set = self.filter(pairs)?;
        let mut items = set.fetch_all()?;
        match items.len() {
            1 => Ok(items.remove(0)),
            0 => Err(MacaronError::DoesNotExist(format!(
                "{} matching query does not exist.",
                self.meta.name()
            ))),
            n => Err(MacaronError::MultipleObjectsReturned(format!(
                "get() returned more than one {} -- it returned {n}!",
                self.meta.name()
            ))),
        }
    }

    /// The item whose primary key equals `key`.
    pub fn get_by_pk(&self, key: impl Into<Value>) -> MacaronResult<T> {
        self.get([("pk", key.into())])
    }
}

/// Iterator over a [`QuerySet`]'s items. Ends with `None` once rows run out.
pub struct Iter<'a, T: FromRow> {
    set: &'a mut QuerySet<T>,
    failed: Option<MacaronError>,
}

impl<T: FromRow> Iterator for Iter<'_, T> {
    type Item = MacaronResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failed.take() {
            return Some(Err(err));
        }
        self.set.advance()
    }
}

impl<'a, T: FromRow> IntoIterator for &'a mut QuerySet<T> {
    type Item = MacaronResult<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
