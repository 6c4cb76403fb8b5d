//! Schema resolution and table creation.
//!
//! The live table is the source of truth for a model's columns. [`reflect`]
//! reads `PRAGMA table_info` and produces a [`TableMeta`]: declared
//! descriptors are matched by column name and take nullability, default and
//! key status from the table, and undeclared columns get a descriptor
//! inferred from their declared SQL type.

use once_cell::sync::Lazy;
use regex::Regex;

use macaron_core::{MacaronError, MacaronResult};

use crate::executor::{ColumnInfo, DbExecutor, Row};
use crate::fields::{FieldDef, FieldKind};
use crate::model::{ModelDef, RelationKind};
use crate::query::compiler::quote;
use crate::value::Value;

static CHAR_LENGTH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:N?VAR)?CHAR(?:ACTER)?\s*\(\s*(\d+)\s*\)").ok());

static TYPE_RULES: Lazy<Vec<(Regex, fn() -> FieldKind)>> = Lazy::new(|| {
    let rules: [(&str, fn() -> FieldKind); 7] = [
        (r"(?i)INT", || FieldKind::Integer),
        (r"(?i)BOOL", || FieldKind::Boolean),
        (r"(?i)TIMESTAMP|DATETIME", || FieldKind::Timestamp),
        (r"(?i)^\s*DATE\s*$", || FieldKind::Date),
        (r"(?i)^\s*TIME\s*$", || FieldKind::Time),
        (r"(?i)CHAR|CLOB|TEXT", || FieldKind::Text),
        (r"(?i)REAL|FLOA|DOUB|NUMERIC|DECIMAL", || FieldKind::Float),
    ];
    rules
        .into_iter()
        .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
        .collect()
});

/// Infers a descriptor for a column that no model declares.
fn inferred_field(column: &ColumnInfo) -> FieldDef {
    if let Some(caps) = CHAR_LENGTH
        .as_ref()
        .and_then(|re| re.captures(&column.decl_type))
    {
        let mut field = FieldDef::char(column.name.clone());
        field.max_length = caps[1].parse().ok();
        return field;
    }
    let kind = TYPE_RULES
        .iter()
        .find(|(re, _)| re.is_match(&column.decl_type))
        .map_or(FieldKind::Text, |(_, kind)| kind());
    FieldDef::new(column.name.clone(), kind)
}

/// Parses a `dflt_value` expression into a value for `field`.
fn parse_default(field: &FieldDef, raw: Option<&str>) -> Option<Value> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    let text = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map_or_else(|| raw.to_string(), |s| s.replace("''", "'"));
    field.cast(Value::String(text)).ok()
}

/// The resolved description of a model backed by a live table.
#[derive(Debug, Clone)]
pub struct TableMeta {
    model: ModelDef,
    fields: Vec<FieldDef>,
    pk: usize,
}

impl TableMeta {
    /// The model definition this table backs.
    pub fn model(&self) -> &ModelDef {
        &self.model
    }

    /// The model name.
    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// The table name.
    pub fn table(&self) -> &str {
        self.model.table()
    }

    /// Field descriptors in table column order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by name or column.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    /// Index of the field with this name or column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.column == name))
    }

    /// The primary-key descriptor.
    pub fn pk(&self) -> &FieldDef {
        &self.fields[self.pk]
    }

    /// Index of the primary key among [`fields`](Self::fields).
    pub const fn pk_index(&self) -> usize {
        self.pk
    }

    /// Converts a fetched row to object-form values in field order.
    pub fn row_values(&self, row: &Row) -> MacaronResult<Vec<Value>> {
        self.fields
            .iter()
            .map(|f| {
                let raw = row.get_value(&f.column).cloned().unwrap_or(Value::Null);
                f.to_object(raw)
            })
            .collect()
    }
}

/// Builds the [`TableMeta`] for `model` from its table's column list.
///
/// # Errors
///
/// `TableNotFound` when `columns` is empty, `ImproperlyConfigured` when the
/// table does not have exactly one primary-key column.
pub fn reflect(model: &ModelDef, columns: &[ColumnInfo]) -> MacaronResult<TableMeta> {
    if columns.is_empty() {
        return Err(MacaronError::TableNotFound(model.table().to_string()));
    }
    let mut columns = columns.to_vec();
    columns.sort_by_key(|c| c.cid);

    let mut fields = Vec::with_capacity(columns.len());
    for column in &columns {
        let mut field = model
            .fields()
            .iter()
            .find(|f| f.column == column.name)
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!(
                    table = model.table(),
                    column = %column.name,
                    decl_type = %column.decl_type,
                    "inferring undeclared column"
                );
                let mut f = inferred_field(column);
                f.user_defined = false;
                f
            });

        field.primary_key = column.primary_key > 0;
        field.null = !column.not_null;
        if let Some(default) = parse_default(&field, column.default.as_deref()) {
            field.default = Some(default);
        }
        if field.primary_key && field.kind.is_integer() {
            field.kind = FieldKind::Serial;
            field.null = true;
        }
        fields.push(field);
    }

    for declared in model.fields() {
        if !fields.iter().any(|f| f.column == declared.column) {
            tracing::warn!(
                table = model.table(),
                column = %declared.column,
                "declared field has no column in the table"
            );
        }
    }

    let keys: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.primary_key.then_some(i))
        .collect();
    let pk = match keys.as_slice() {
        [pk] => *pk,
        [] => {
            return Err(MacaronError::ImproperlyConfigured(format!(
                "Table \"{}\" has no primary key",
                model.table()
            )));
        }
        _ => {
            return Err(MacaronError::ImproperlyConfigured(format!(
                "Table \"{}\" has a composite primary key",
                model.table()
            )));
        }
    };

    Ok(TableMeta {
        model: model.clone(),
        fields,
        pk,
    })
}

/// Reads the live table for `model`.
pub fn load(executor: &dyn DbExecutor, model: &ModelDef) -> MacaronResult<TableMeta> {
    reflect(model, &executor.table_info(model.table())?)
}

fn literal(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("'{}'", text.replace('\'', "''"))
}

fn column_definition(model: &ModelDef, field: &FieldDef) -> MacaronResult<String> {
    let mut sql = format!("  {} {}", quote(&field.column), field.sql_type());
    if field.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if !field.null || field.primary_key {
        sql.push_str(" NOT NULL");
    }
    if field.unique && !field.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        let stored = field.to_database(default)?;
        if !stored.is_null() {
            sql.push_str(" DEFAULT ");
            sql.push_str(&literal(&stored));
        }
    }
    let reference = model
        .relations()
        .iter()
        .find(|r| r.kind == RelationKind::ManyToOne && r.local_column == field.column);
    if let Some(rel) = reference {
        sql.push_str(&format!(
            " REFERENCES {}({})",
            quote(&rel.target_table),
            quote(&rel.remote_column)
        ));
        if let Some(decl) = model.many_to_one().iter().find(|m| m.name == rel.name) {
            if let Some(action) = decl.on_delete {
                sql.push_str(" ON DELETE ");
                sql.push_str(action.as_sql());
            }
            if let Some(action) = decl.on_update {
                sql.push_str(" ON UPDATE ");
                sql.push_str(action.as_sql());
            }
        }
    }
    Ok(sql)
}

/// Generates the `CREATE TABLE` statement for a registered model.
pub fn create_table_sql(model: &ModelDef) -> MacaronResult<String> {
    let mut lines = model
        .fields()
        .iter()
        .map(|f| column_definition(model, f))
        .collect::<MacaronResult<Vec<_>>>()?;
    for group in model.unique_together() {
        let columns: Vec<String> = group
            .iter()
            .map(|name| quote(model.field(name).map_or(name.as_str(), |f| f.column.as_str())))
            .collect();
        lines.push(format!("  UNIQUE ({})", columns.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        quote(model.table()),
        lines.join(",\n")
    ))
}

/// Creates the table for `model` and returns its resolved description.
///
/// # Errors
///
/// `TableAlreadyExists` when the table is already present.
pub fn create_table(executor: &dyn DbExecutor, model: &ModelDef) -> MacaronResult<TableMeta> {
    if !executor.table_info(model.table())?.is_empty() {
        return Err(MacaronError::TableAlreadyExists(model.table().to_string()));
    }
    let sql = create_table_sql(model)?;
    tracing::info!(model = model.name(), table = model.table(), "creating table");
    executor.execute(&sql, &[])?;
    load(executor, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::{column, RecordingExecutor};
    use crate::model::{ManyToOne, ReferentialAction};
    use crate::registry::Registry;
    use pretty_assertions::assert_eq;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                ModelDef::builder("Team")
                    .field(FieldDef::char("name").max_length(20))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ModelDef::builder("Member")
                    .many_to_one(
                        ManyToOne::new("team", "Team")
                            .nullable()
                            .related_name("members")
                            .on_delete(ReferentialAction::SetNull)
                            .on_update(ReferentialAction::Cascade),
                    )
                    .field(FieldDef::char("first_name").max_length(20).default("unknown"))
                    .field(FieldDef::char("last_name").max_length(20).default("noname"))
                    .field(FieldDef::char("part").max_length(10))
                    .field(FieldDef::integer("age").default(16).min(15.0).max(18.0))
                    .unique_together(["first_name", "last_name"])
                    .ordering(["-id"])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_create_table_sql_simple() {
        let registry = registry();
        let sql = create_table_sql(registry.get("Team").unwrap()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"team\" (\n  \"id\" INTEGER PRIMARY KEY NOT NULL,\n  \"name\" VARCHAR(20) NOT NULL\n)"
        );
    }

    #[test]
    fn test_create_table_sql_with_reference_and_defaults() {
        let registry = registry();
        let sql = create_table_sql(registry.get("Member").unwrap()).unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines[0], "CREATE TABLE \"member\" (");
        assert_eq!(lines[1], "  \"id\" INTEGER PRIMARY KEY NOT NULL,");
        assert_eq!(
            lines[2],
            "  \"team_id\" INTEGER REFERENCES \"team\"(\"id\") ON DELETE SET NULL ON UPDATE CASCADE,"
        );
        assert_eq!(
            lines[3],
            "  \"first_name\" VARCHAR(20) NOT NULL DEFAULT 'unknown',"
        );
        assert_eq!(lines[4], "  \"last_name\" VARCHAR(20) NOT NULL DEFAULT 'noname',");
        assert_eq!(lines[5], "  \"part\" VARCHAR(10) NOT NULL,");
        assert_eq!(lines[6], "  \"age\" INTEGER NOT NULL DEFAULT '16',");
        assert_eq!(lines[7], "  UNIQUE (\"first_name\", \"last_name\")");
        assert_eq!(lines[8], ")");
    }

    #[test]
    fn test_default_literal_is_escaped() {
        let model = ModelDef::builder("Quote")
            .field(FieldDef::text("said").default("it's"))
            .build()
            .unwrap();
        let sql = create_table_sql(&model).unwrap();
        assert!(sql.contains("DEFAULT 'it''s'"));
    }

    #[test]
    fn test_reflect_missing_table() {
        let registry = registry();
        let err = reflect(registry.get("Team").unwrap(), &[]).unwrap_err();
        assert!(matches!(err, MacaronError::TableNotFound(ref t) if t == "team"));
    }

    #[test]
    fn test_reflect_takes_attributes_from_table() {
        let registry = registry();
        let mut age = column(5, "age", "INTEGER", true, 0);
        age.default = Some("'16'".into());
        let mut first = column(2, "first_name", "VARCHAR(20)", true, 0);
        first.default = Some("'unknown'".into());
        let columns = vec![
            column(0, "id", "INTEGER", true, 1),
            column(1, "team_id", "INTEGER", false, 0),
            first,
            column(3, "last_name", "VARCHAR(20)", true, 0),
            column(4, "part", "VARCHAR(10)", true, 0),
            age,
        ];
        let meta = reflect(registry.get("Member").unwrap(), &columns).unwrap();
        assert_eq!(meta.fields().len(), 6);
        assert_eq!(meta.pk().column, "id");
        assert!(meta.pk().null);
        assert!(matches!(meta.pk().kind, FieldKind::Serial));
        assert_eq!(meta.field("age").unwrap().default, Some(Value::Int(16)));
        assert_eq!(meta.field("age").unwrap().max, Some(18.0));
        assert_eq!(
            meta.field("first_name").unwrap().default,
            Some(Value::from("unknown"))
        );
        assert!(meta.field("team_id").unwrap().null);
    }

    #[test]
    fn test_reflect_infers_undeclared_columns() {
        let model = ModelDef::builder("Legacy").build().unwrap();
        let mut flag = column(4, "flag", "BOOLEAN", false, 0);
        flag.default = Some("NULL".into());
        let columns = vec![
            column(0, "id", "INTEGER", true, 1),
            column(1, "code", "VARCHAR(8)", true, 0),
            column(2, "score", "REAL", false, 0),
            column(3, "seen", "TIMESTAMP", false, 0),
            flag,
            column(5, "blob", "", false, 0),
        ];
        let meta = reflect(&model, &columns).unwrap();
        let code = meta.field("code").unwrap();
        assert!(matches!(code.kind, FieldKind::Char));
        assert_eq!(code.max_length, Some(8));
        assert!(!code.user_defined);
        assert!(matches!(meta.field("score").unwrap().kind, FieldKind::Float));
        assert!(matches!(meta.field("seen").unwrap().kind, FieldKind::Timestamp));
        assert!(matches!(meta.field("flag").unwrap().kind, FieldKind::Boolean));
        assert_eq!(meta.field("flag").unwrap().default, None);
        assert!(matches!(meta.field("blob").unwrap().kind, FieldKind::Text));
    }

    #[test]
    fn test_reflect_requires_single_key() {
        let model = ModelDef::builder("Pair").build().unwrap();
        let columns = vec![
            column(0, "a", "INTEGER", true, 1),
            column(1, "b", "INTEGER", true, 2),
        ];
        assert!(matches!(
            reflect(&model, &columns),
            Err(MacaronError::ImproperlyConfigured(_))
        ));
        let columns = vec![column(0, "a", "INTEGER", true, 0)];
        assert!(reflect(&model, &columns).is_err());
    }

    #[test]
    fn test_create_table_rejects_existing() {
        let registry = registry();
        let exec = RecordingExecutor::default();
        exec.add_table("team", vec![column(0, "id", "INTEGER", true, 1)]);
        let err = create_table(&exec, registry.get("Team").unwrap()).unwrap_err();
        assert!(matches!(err, MacaronError::TableAlreadyExists(_)));
        assert!(exec.statements().is_empty());
    }
}
