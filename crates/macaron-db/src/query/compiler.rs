//! Query state and SQL compilation.
//!
//! A [`Query`] holds already-compiled clause fragments. Path resolution and
//! parameter conversion happen when clauses are added (see
//! [`QuerySet`](super::QuerySet)); compiling only lays the fragments out in
//! a fixed clause order, one clause per line:
//!
//! ```text
//! SELECT [DISTINCT ]"<t>".* FROM "<t>"
//! INNER JOIN "<t2>" AS "<t>.<rel>" ON "<t>"."<fk>" = "<t>.<rel>"."<ref>"
//! WHERE (<cond1>) AND (<cond2>)
//! ORDER BY "<alias>"."<col>"[ DESC], ...
//! LIMIT <n>[ OFFSET <m>]
//! ```

use crate::value::Value;

/// Double-quotes an identifier.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"<alias>"."<column>"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote(alias), quote(column))
}

/// An `INNER JOIN` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Alias; the dotted relationship path.
    pub alias: String,
    /// Compiled `ON` condition.
    pub on: String,
}

/// The clause set of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Root table.
    pub table: String,
    /// Select list; `"<table>".*` when empty.
    pub select: Vec<String>,
    /// Joins in the order they were added.
    pub joins: Vec<Join>,
    /// WHERE fragments, conjoined.
    pub wheres: Vec<String>,
    /// Parameters of the WHERE fragments, in order.
    pub params: Vec<Value>,
    /// Compiled ORDER BY terms.
    pub order_by: Vec<String>,
    /// Row limit.
    pub limit: Option<i64>,
    /// Row offset.
    pub offset: Option<i64>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
}

impl Query {
    /// Creates an unfiltered query over `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Adds a join unless one with the same alias exists.
    pub fn add_join(&mut self, join: Join) {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
    }

    /// Compiles the SELECT statement.
    pub fn compile_select(&self) -> (String, Vec<Value>) {
        let mut lines = Vec::new();
        let columns = if self.select.is_empty() {
            format!("{}.*", quote(&self.table))
        } else {
            self.select.join(", ")
        };
        lines.push(format!(
            "SELECT {}{columns} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            quote(&self.table)
        ));

        for join in &self.joins {
            lines.push(format!(
                "INNER JOIN {} AS {} ON {}",
                quote(&join.table),
                quote(&join.alias),
                join.on
            ));
        }

        if !self.wheres.is_empty() {
            let conds: Vec<String> = self.wheres.iter().map(|w| format!("({w})")).collect();
            lines.push(format!("WHERE {}", conds.join(" AND ")));
        }

        if !self.order_by.is_empty() {
            lines.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => lines.push(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => lines.push(format!("LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT.
            (None, Some(offset)) => lines.push(format!("LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (lines.join("\n"), self.params.clone())
    }

    /// Wraps the SELECT as a subquery: `SELECT <func>(<expr>) FROM (<query>)`.
    pub fn compile_aggregate(&self, func: &str, column: Option<&str>) -> (String, Vec<Value>) {
        let (inner, params) = self.compile_select();
        let expr = column.map_or_else(|| "*".to_string(), quote);
        (format!("SELECT {func}({expr}) FROM ({inner})"), params)
    }

    /// `DELETE FROM "<t>" WHERE "<pk>" IN (<SELECT of pk>)`.
    pub fn compile_delete(&self, pk: &str) -> (String, Vec<Value>) {
        let mut inner = self.clone();
        inner.select = vec![qualified(&self.table, pk)];
        inner.distinct = false;
        let (inner, params) = inner.compile_select();
        (
            format!(
                "DELETE FROM {} WHERE {} IN ({inner})",
                quote(&self.table),
                quote(pk)
            ),
            params,
        )
    }
}

/// Compiles an INSERT statement.
pub fn compile_insert(table: &str, fields: &[(&str, Value)]) -> (String, Vec<Value>) {
    if fields.is_empty() {
        return (format!("INSERT INTO {} DEFAULT VALUES", quote(table)), Vec::new());
    }
    let columns: Vec<String> = fields.iter().map(|(name, _)| quote(name)).collect();
    let placeholders = vec!["?"; fields.len()].join(", ");
    let params = fields.iter().map(|(_, v)| v.clone()).collect();
    (
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(table),
            columns.join(", ")
        ),
        params,
    )
}

/// Compiles an UPDATE of one row identified by its key.
pub fn compile_update(
    table: &str,
    fields: &[(&str, Value)],
    pk: &str,
    key: Value,
) -> (String, Vec<Value>) {
    let set_parts: Vec<String> = fields
        .iter()
        .map(|(name, _)| format!("{} = ?", quote(name)))
        .collect();
    let mut params: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
    params.push(key);
    (
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote(table),
            set_parts.join(", "),
            quote(pk)
        ),
        params,
    )
}
