//! Transaction support.
//!
//! The backend opens a transaction implicitly before the first write, so a
//! transaction here is simply the span between two commits. [`atomic`] runs
//! a closure in that span and ends it with a commit or a rollback depending
//! on the closure's result.
//!
//! # Examples
//!
//! ```ignore
//! use macaron_db::transactions::atomic;
//!
//! let result = atomic(&db, |db| {
//!     let team = db.objects("Team")?.create([("name", "Splash Star")])?;
//!     team.reverse("members")?.append([("first_name", "Saki")])?;
//!     Ok(team)
//! });
//! if matches!(result, Err(ref e) if e.is_integrity()) {
//!     // everything written inside the closure was rolled back
//! }
//! ```

use macaron_core::MacaronResult;

use crate::database::Database;

/// Runs `f`, committing if it returns `Ok` and rolling back if it returns
/// `Err`.
///
/// The closure's error is returned unchanged; a failure of the rollback
/// itself is logged and otherwise ignored so the original error wins.
pub fn atomic<T, F>(db: &Database, f: F) -> MacaronResult<T>
where
    F: FnOnce(&Database) -> MacaronResult<T>,
{
    let span = macaron_core::logging::unit_of_work_span(db.name());
    let _guard = span.enter();

    match f(db) {
        Ok(result) => {
            db.commit()?;
            tracing::debug!("committed");
            Ok(result)
        }
        Err(err) => {
            if let Err(rollback_err) = db.rollback() {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            tracing::debug!(error = %err, "rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use macaron_core::MacaronError;

    use crate::executor::{ColumnInfo, DbExecutor, Row};
    use crate::registry::Registry;
    use crate::value::Value;

    #[derive(Debug, Default)]
    struct Counting {
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
    }

    impl DbExecutor for Counting {
        fn execute(&self, _sql: &str, _params: &[Value]) -> MacaronResult<usize> {
            Ok(0)
        }

        fn insert(&self, _sql: &str, _params: &[Value]) -> MacaronResult<i64> {
            Ok(0)
        }

        fn query(&self, _sql: &str, _params: &[Value]) -> MacaronResult<Vec<Row>> {
            Ok(Vec::new())
        }

        fn table_info(&self, _table: &str) -> MacaronResult<Vec<ColumnInfo>> {
            Ok(Vec::new())
        }

        fn commit(&self) -> MacaronResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&self) -> MacaronResult<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> MacaronResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    fn database() -> (Database, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let exec = Counting::default();
        let commits = Arc::clone(&exec.commits);
        let rollbacks = Arc::clone(&exec.rollbacks);
        let db = Database::open(exec, Registry::new(), false).unwrap();
        (db, commits, rollbacks)
    }

    #[test]
    fn test_atomic_commits_on_ok() {
        let (db, commits, rollbacks) = database();
        let value = atomic(&db, |_| Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_atomic_rolls_back_on_err() {
        let (db, commits, rollbacks) = database();
        let result: MacaronResult<()> = atomic(&db, |_| {
            Err(MacaronError::IntegrityError("UNIQUE constraint failed".into()))
        });
        assert!(result.unwrap_err().is_integrity());
        assert_eq!(commits.load(Ordering::SeqCst), 0);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }
}
