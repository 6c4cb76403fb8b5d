//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`] which implements the
//! [`DbExecutor`] trait over a single `rusqlite` connection.
//!
//! Features:
//! - In-memory database support via `:memory:` path (great for testing)
//! - A lazy variant that opens the file on the first statement
//! - Foreign key enforcement and a `REGEXP` function backed by the `regex` crate
//! - One implicit transaction: `BEGIN` is issued before the first write

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use macaron_core::{MacaronError, MacaronResult};
use macaron_db::fields::temporal;
use macaron_db::{DbExecutor, Row, Value};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

enum ConnState {
    /// Lazy connection that has not run a statement yet.
    Pending { path: PathBuf, foreign_keys: bool },
    Open(Connection),
    Closed,
}

/// A SQLite database backend.
///
/// The connection sits behind a `std::sync::Mutex` so the backend can be
/// shared as a `DbExecutor` trait object; statements still run one at a time.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:"), used as the log label.
    name: String,
    state: Mutex<ConnState>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    ///
    /// # Errors
    ///
    /// Returns an `OperationalError` if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>, foreign_keys: bool) -> MacaronResult<Self> {
        let path = path.into();
        let conn = connect(&path, foreign_keys)?;
        tracing::debug!(path = %path.display(), "opened SQLite connection");
        Ok(Self {
            name: path.display().to_string(),
            state: Mutex::new(ConnState::Open(conn)),
        })
    }

    /// Prepares a connection that is opened on the first statement.
    ///
    /// Commit, rollback and close do nothing until then, so a program that
    /// never touches the database never creates the file.
    pub fn open_lazy(path: impl Into<PathBuf>, foreign_keys: bool) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            state: Mutex::new(ConnState::Pending { path, foreign_keys }),
        }
    }

    /// Opens an in-memory database with foreign keys enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> MacaronResult<Self> {
        Self::open(":memory:", true)
    }

    /// Returns `true` once the underlying connection exists.
    pub fn is_connected(&self) -> bool {
        matches!(*self.lock(), ConnState::Open(_))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the connection, opening a lazy connection first.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> MacaronResult<T>) -> MacaronResult<T> {
        let mut state = self.lock();
        let pending = match &*state {
            ConnState::Pending { path, foreign_keys } => Some((path.clone(), *foreign_keys)),
            _ => None,
        };
        if let Some((path, foreign_keys)) = pending {
            let conn = connect(&path, foreign_keys)?;
            tracing::debug!(path = %path.display(), "opened lazy SQLite connection");
            *state = ConnState::Open(conn);
        }
        match &*state {
            ConnState::Open(conn) => f(conn),
            _ => Err(closed()),
        }
    }

    /// Runs `f` only if the connection has been opened.
    fn if_connected(&self, f: impl FnOnce(&Connection) -> MacaronResult<()>) -> MacaronResult<()> {
        match &*self.lock() {
            ConnState::Open(conn) => f(conn),
            ConnState::Pending { .. } => Ok(()),
            ConnState::Closed => Err(closed()),
        }
    }

    /// Binds ORM `Value` types to a `rusqlite` statement.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> MacaronResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, i64::from(*b)),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, temporal::format_date(d)),
                Value::DateTime(dt) => {
                    stmt.raw_bind_parameter(idx, temporal::format_timestamp(dt))
                }
                Value::Time(t) => stmt.raw_bind_parameter(idx, temporal::format_time(t)),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(_) => {
                    return Err(MacaronError::DatabaseError(format!(
                        "Bind error: parameter {idx} is a list; list parameters must be expanded"
                    )));
                }
            }
            .map_err(|e| MacaronError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> MacaronResult<Row> {
        let values = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row.get_ref(i).map_err(map_error)?;
                Ok(match val_ref {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int(v),
                    ValueRef::Real(v) => Value::Float(v),
                    ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).to_string()),
                    ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                })
            })
            .collect::<MacaronResult<Vec<_>>>()?;
        Ok(Row::new(column_names.to_vec(), values))
    }

    fn run(conn: &Connection, sql: &str, params: &[Value]) -> MacaronResult<usize> {
        tracing::debug!(sql, params = ?params, "execute");
        if conn.is_autocommit() && starts_transaction(sql) {
            conn.execute_batch("BEGIN").map_err(map_error)?;
        }
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        stmt.raw_execute().map_err(map_error)
    }
}

impl DbExecutor for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, sql: &str, params: &[Value]) -> MacaronResult<usize> {
        self.with_conn(|conn| Self::run(conn, sql, params))
    }

    fn insert(&self, sql: &str, params: &[Value]) -> MacaronResult<i64> {
        self.with_conn(|conn| {
            Self::run(conn, sql, params)?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> MacaronResult<Vec<Row>> {
        tracing::debug!(sql, params = ?params, "query");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(map_error)?;

            let column_names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            Self::bind_params(&mut stmt, params)?;

            let mut raw_rows = stmt.raw_query();

            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next().map_err(map_error)? {
                rows.push(Self::convert_row(row, &column_names)?);
            }

            Ok(rows)
        })
    }

    fn commit(&self) -> MacaronResult<()> {
        self.if_connected(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            tracing::debug!(database = %self.name, "commit");
            conn.execute_batch("COMMIT").map_err(map_error)
        })
    }

    fn rollback(&self) -> MacaronResult<()> {
        self.if_connected(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            tracing::debug!(database = %self.name, "rollback");
            conn.execute_batch("ROLLBACK").map_err(map_error)
        })
    }

    fn close(&self) -> MacaronResult<()> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, ConnState::Closed) {
            ConnState::Open(conn) => {
                tracing::debug!(database = %self.name, "closing SQLite connection");
                conn.close().map_err(|(_, e)| {
                    MacaronError::OperationalError(format!("SQLite close failed: {e}"))
                })
            }
            ConnState::Pending { .. } | ConnState::Closed => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        !matches!(*self.lock(), ConnState::Closed)
    }
}

fn closed() -> MacaronError {
    MacaronError::OperationalError("Cannot operate on a closed database.".to_string())
}

/// Maps engine errors: constraint failures become `IntegrityError`.
fn map_error(err: rusqlite::Error) -> MacaronError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            MacaronError::IntegrityError(err.to_string())
        }
        _ => MacaronError::DatabaseError(err.to_string()),
    }
}

fn starts_transaction(sql: &str) -> bool {
    let keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(keyword.as_str(), "INSERT" | "UPDATE" | "DELETE" | "REPLACE")
}

fn connect(path: &Path, foreign_keys: bool) -> MacaronResult<Connection> {
    let conn = if path.to_str() == Some(":memory:") {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| MacaronError::OperationalError(format!("SQLite open failed: {e}")))?;

    if foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MacaronError::OperationalError(format!("Failed to set pragmas: {e}")))?;
    }
    register_regexp(&conn)
        .map_err(|e| MacaronError::OperationalError(format!("Failed to register REGEXP: {e}")))?;
    Ok(conn)
}

/// Registers `REGEXP` so that `text REGEXP pattern` works. SQLite calls the
/// function as `regexp(pattern, text)`; a null operand yields null.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            if matches!(ctx.get_raw(0), ValueRef::Null) {
                return Ok(None);
            }
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let text = match ctx.get_raw(1) {
                ValueRef::Null => return Ok(None),
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(b) | ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            };
            Ok(Some(re.is_match(&text)))
        },
    )
}
