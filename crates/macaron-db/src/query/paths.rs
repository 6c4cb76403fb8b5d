//! Relationship path resolution.
//!
//! Each relationship hop in a `__`-separated path adds an `INNER JOIN`
//! aliased by the dotted path walked so far. Many-to-many hops add the link
//! table first, aliased `<path>.lnk`. The final segment names a column of the
//! last model reached; if it names a relationship instead, the comparison is
//! against the key on the far side of that relationship.

use std::sync::Arc;

use macaron_core::{MacaronError, MacaronResult};

use super::compiler::{qualified, Join, Query};
use super::lookups::Arg;
use crate::database::Database;
use crate::fields::FieldDef;
use crate::model::RelationKind;
use crate::schema::TableMeta;

/// The model whose key a column holds, and the column of that model the key
/// is taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOf {
    /// Model name.
    pub model: String,
    /// Column of that model holding the key.
    pub column: String,
}

/// A resolved path: the qualified column and its descriptor.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// `"<alias>"."<column>"`
    pub column: String,
    /// Descriptor of the compared column.
    pub field: FieldDef,
    /// Set when the column holds a record key: a primary key, a foreign key,
    /// or the far side of a relationship.
    pub key_of: Option<KeyOf>,
}

impl Resolved {
    /// Replaces a record argument with its key, after checking the record
    /// belongs to the model this column refers to.
    ///
    /// # Errors
    ///
    /// `TypeError` for a record of another model, or for a column that holds
    /// no record key.
    pub fn bind(&self, arg: Arg) -> MacaronResult<Arg> {
        let record = match arg {
            Arg::Record(record) => record,
            other => return Ok(other),
        };
        match &self.key_of {
            Some(key_of) if key_of.model == record.model_name() => {
                Ok(Arg::Value(record.get(&key_of.column)?.clone()))
            }
            Some(key_of) => Err(MacaronError::TypeError(format!(
                "{} expects a {} record, not {}",
                self.column,
                key_of.model,
                record.model_name()
            ))),
            None => Err(MacaronError::TypeError(format!(
                "{} does not hold a record key; cannot compare it with a {} record",
                self.column,
                record.model_name()
            ))),
        }
    }
}

fn column_of(meta: &TableMeta, alias: &str, name: &str) -> Option<Resolved> {
    let field = if name == "pk" {
        Some(meta.pk())
    } else {
        meta.field(name)
    }?;
    let key_of = if field.column == meta.pk().column {
        Some(KeyOf {
            model: meta.name().to_string(),
            column: field.column.clone(),
        })
    } else {
        meta.model()
            .relations()
            .iter()
            .find(|r| r.kind == RelationKind::ManyToOne && r.local_column == field.column)
            .map(|r| KeyOf {
                model: r.target.clone(),
                column: r.remote_column.clone(),
            })
    };
    Some(Resolved {
        column: qualified(alias, &field.column),
        field: field.clone(),
        key_of,
    })
}

/// Resolves `path` against `root`, adding any joins it needs to `query`.
pub fn resolve(
    db: &Database,
    root: &Arc<TableMeta>,
    query: &mut Query,
    path: &[&str],
) -> MacaronResult<Resolved> {
    let mut meta = Arc::clone(root);
    let mut alias = root.table().to_string();

    for (i, part) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        if last {
            if let Some(resolved) = column_of(&meta, &alias, part) {
                return Ok(resolved);
            }
        }

        let rel = meta.model().relation(part).cloned().ok_or_else(|| {
            MacaronError::InvalidQuery(format!(
                "Cannot resolve keyword '{part}' into field of {}",
                meta.name()
            ))
        })?;
        let target = db.meta(&rel.target)?;
        let next = format!("{alias}.{part}");

        match (&rel.kind, &rel.link) {
            (RelationKind::ManyToMany, Some(link)) => {
                let lnk = format!("{next}.lnk");
                query.add_join(Join {
                    table: link.table.clone(),
                    alias: lnk.clone(),
                    on: format!(
                        "{} = {}",
                        qualified(&alias, &rel.local_column),
                        qualified(&lnk, &link.source_column)
                    ),
                });
                query.add_join(Join {
                    table: rel.target_table.clone(),
                    alias: next.clone(),
                    on: format!(
                        "{} = {}",
                        qualified(&lnk, &link.target_column),
                        qualified(&next, &rel.remote_column)
                    ),
                });
            }
            _ => query.add_join(Join {
                table: rel.target_table.clone(),
                alias: next.clone(),
                on: format!(
                    "{} = {}",
                    qualified(&alias, &rel.local_column),
                    qualified(&next, &rel.remote_column)
                ),
            }),
        }

        if last {
            let key = if rel.kind == RelationKind::ManyToOne {
                rel.remote_column.as_str()
            } else {
                "pk"
            };
            let mut resolved = column_of(&target, &next, key).ok_or_else(|| {
                MacaronError::InvalidQuery(format!("{} has no column '{key}'", target.name()))
            })?;
            resolved.key_of = Some(KeyOf {
                model: target.name().to_string(),
                column: resolved.field.column.clone(),
            });
            return Ok(resolved);
        }
        meta = target;
        alias = next;
    }

    Err(MacaronError::InvalidQuery("Empty lookup path".to_string()))
}
