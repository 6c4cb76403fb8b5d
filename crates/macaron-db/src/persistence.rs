//! Create, save, delete and refresh.
//!
//! Every write validates the whole record before any SQL runs, converts
//! values to their database form, and refetches the row afterwards so the
//! record reflects what the engine actually stored (assigned keys, column
//! defaults, trigger effects).

use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult};

use crate::database::Database;
use crate::fields::AutoNow;
use crate::model::ModelHooks;
use crate::query::compiler::{compile_insert, compile_update, quote};
use crate::query::QuerySet;
use crate::record::Record;
use crate::schema::TableMeta;
use crate::value::Value;

fn hooks(record: &Record) -> Option<Arc<dyn ModelHooks>> {
    record.meta().model().hooks().cloned()
}

/// Sets every engine-computed field that applies at this stage.
fn apply_auto_values(record: &mut Record, creating: bool) -> MacaronResult<()> {
    let meta = Arc::clone(record.meta());
    for field in meta.fields() {
        let applies = match field.auto {
            Some(AutoNow::OnCreate) => creating,
            Some(AutoNow::OnSave) => true,
            None => false,
        };
        if applies {
            if let Some(value) = field.auto_value(creating) {
                record.set(&field.name, value)?;
            }
        }
    }
    Ok(())
}

/// `(column, database value)` pairs for every field, in column order.
fn database_values(record: &Record, skip_null_key: bool) -> MacaronResult<Vec<(&str, Value)>> {
    let meta = record.meta();
    meta.fields()
        .iter()
        .zip(record.raw_values())
        .enumerate()
        .filter(|(i, (_, value))| !(skip_null_key && *i == meta.pk_index() && value.is_null()))
        .map(|(_, (field, value))| Ok((field.column.as_str(), field.to_database(value)?)))
        .collect()
}

fn fetch(db: &Database, meta: &Arc<TableMeta>, key: Value) -> MacaronResult<Record> {
    QuerySet::new(db.clone(), Arc::clone(meta)).get_by_pk(key)
}

/// Creates and stores a new record.
///
/// Field defaults are applied first, then `fields`, then engine-computed
/// values. The primary key is only sent when one was supplied.
pub fn create<I, K, V>(db: &Database, meta: &Arc<TableMeta>, fields: I) -> MacaronResult<Record>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    let mut record = Record::new(db.clone(), Arc::clone(meta));
    for (name, value) in fields {
        record.set(name.as_ref(), value)?;
    }
    apply_auto_values(&mut record, true)?;

    let hooks = hooks(&record);
    if let Some(h) = &hooks {
        h.before_create(&mut record)?;
    }
    record.validate()?;

    let (sql, params) = compile_insert(meta.table(), &database_values(&record, true)?);
    let rowid = db.insert(&sql, &params)?;
    let key = if record.pk().is_null() {
        Value::Int(rowid)
    } else {
        record.pk().clone()
    };
    let stored = fetch(db, meta, key)?;
    record.load_from(stored);
    tracing::debug!(model = meta.name(), pk = %record.pk(), "created record");

    if let Some(h) = &hooks {
        h.after_create(&mut record)?;
    }
    Ok(record)
}

/// Writes every column of `record` to the row it was loaded from.
pub fn save(record: &mut Record) -> MacaronResult<()> {
    apply_auto_values(record, false)?;
    let hooks = hooks(record);
    if let Some(h) = &hooks {
        h.before_save(record)?;
    }
    record.validate()?;

    let meta = Arc::clone(record.meta());
    let original = record.original_pk().cloned().ok_or_else(|| {
        MacaronError::DoesNotExist(format!("{} record was never stored", meta.name()))
    })?;
    let original = meta.pk().to_database(&original)?;
    let (sql, params) = compile_update(
        meta.table(),
        &database_values(record, false)?,
        &meta.pk().column,
        original,
    );
    let db = record.database().clone();
    if db.execute(&sql, &params)? == 0 {
        return Err(MacaronError::DoesNotExist(format!(
            "{} matching query does not exist.",
            meta.name()
        )));
    }
    let stored = fetch(&db, &meta, record.pk().clone())?;
    record.load_from(stored);
    tracing::debug!(model = meta.name(), pk = %record.pk(), "saved record");

    if let Some(h) = &hooks {
        h.after_save(record)?;
    }
    Ok(())
}

/// Deletes the row of `record` by primary key.
pub fn delete(record: &Record) -> MacaronResult<usize> {
    let hooks = hooks(record);
    if let Some(h) = &hooks {
        h.before_delete(record)?;
    }
    let meta = record.meta();
    let key = record.original_pk().unwrap_or_else(|| record.pk());
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote(meta.table()),
        quote(&meta.pk().column)
    );
    let deleted = record
        .database()
        .execute(&sql, &[meta.pk().to_database(key)?])?;
    tracing::debug!(model = meta.name(), pk = %key, deleted, "deleted record");
    if let Some(h) = &hooks {
        h.after_delete(record)?;
    }
    Ok(deleted)
}

/// Reloads `record` from its row.
pub fn refresh(record: &mut Record) -> MacaronResult<()> {
    let meta = Arc::clone(record.meta());
    let key = record.original_pk().unwrap_or_else(|| record.pk()).clone();
    let stored = fetch(record.database(), &meta, key)?;
    record.load_from(stored);
    Ok(())
}
