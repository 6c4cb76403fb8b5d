//! The execution seam between the ORM and a database backend.
//!
//! The [`DbExecutor`] trait lives in the ORM crate so that persistence and
//! query execution can be written without depending on a concrete backend.
//! `macaron-db-backends` provides the SQLite implementation.

use macaron_core::{MacaronError, MacaronResult};

use crate::value::{FromValue, Value};

/// A single result row: column names paired with database-form values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets the raw value of a column.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> MacaronResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            MacaronError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the value cannot be
    /// converted to the requested type.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> MacaronResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            MacaronError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column position.
    pub cid: i64,
    /// Column name.
    pub name: String,
    /// Declared type, as written in the DDL.
    pub decl_type: String,
    /// Whether the column is declared `NOT NULL`.
    pub not_null: bool,
    /// The default expression, as written in the DDL.
    pub default: Option<String>,
    /// 1-based position within the primary key, 0 if not part of it.
    pub primary_key: i64,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> MacaronResult<Self> {
        Ok(Self {
            cid: row.get("cid")?,
            name: row.get("name")?,
            decl_type: row.get::<Option<String>>("type")?.unwrap_or_default(),
            not_null: row.get("notnull")?,
            default: row.get::<Option<String>>("dflt_value").or_else(|_| {
                row.get_value("dflt_value")
                    .map(|v| Some(v.to_string()))
                    .ok_or_else(|| MacaronError::DatabaseError("dflt_value missing".into()))
            })?,
            primary_key: row.get("pk")?,
        })
    }
}

/// Trait for executing SQL against a database connection.
///
/// Implementations are synchronous; one executor serves one connection.
pub trait DbExecutor: Send + Sync {
    /// A label for logs, such as the database file name.
    fn name(&self) -> &str {
        "database"
    }

    /// Runs a statement that does not return rows.
    /// Returns the number of rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> MacaronResult<usize>;

    /// Runs an INSERT and returns the row id the engine assigned.
    fn insert(&self, sql: &str, params: &[Value]) -> MacaronResult<i64>;

    /// Runs a query and returns all result rows.
    fn query(&self, sql: &str, params: &[Value]) -> MacaronResult<Vec<Row>>;

    /// Describes the columns of a table. An empty result means the table
    /// does not exist.
    fn table_info(&self, table: &str) -> MacaronResult<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        self.query(&sql, &[])?
            .iter()
            .map(ColumnInfo::from_row)
            .collect()
    }

    /// Commits the open transaction, if any.
    fn commit(&self) -> MacaronResult<()>;

    /// Rolls back the open transaction, if any.
    fn rollback(&self) -> MacaronResult<()>;

    /// Closes the connection. Further calls fail.
    fn close(&self) -> MacaronResult<()>;

    /// Returns `true` until [`close`](Self::close) is called.
    fn is_open(&self) -> bool;
}

impl<E: DbExecutor + ?Sized> DbExecutor for std::sync::Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(&self, sql: &str, params: &[Value]) -> MacaronResult<usize> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> MacaronResult<i64> {
        (**self).insert(sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> MacaronResult<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn table_info(&self, table: &str) -> MacaronResult<Vec<ColumnInfo>> {
        (**self).table_info(table)
    }

    fn commit(&self) -> MacaronResult<()> {
        (**self).commit()
    }

    fn rollback(&self) -> MacaronResult<()> {
        (**self).rollback()
    }

    fn close(&self) -> MacaronResult<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
