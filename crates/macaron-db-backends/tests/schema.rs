//! Table creation, reflection and connection lifecycle against SQLite.

mod common;

use macaron_core::MacaronError;
use macaron_db::fields::{FieldDef, FieldKind};
use macaron_db::model::{ManyToMany, ModelDef};
use macaron_db::{kwargs, Database, DbExecutor, Registry, Value};
use macaron_db_backends::SqliteBackend;
use pretty_assertions::assert_eq;

#[test]
fn test_create_table_sql_is_what_sqlite_stores() {
    let db = common::teams();
    let rows = db
        .query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::from("team")],
        )
        .unwrap();
    assert_eq!(
        rows[0].get::<String>("sql").unwrap(),
        "CREATE TABLE \"team\" (\n  \"id\" INTEGER PRIMARY KEY NOT NULL,\n  \"name\" VARCHAR(20) NOT NULL\n)"
    );
}

#[test]
fn test_reflected_member_table() {
    let db = common::teams();
    let meta = db.meta("Member").unwrap();
    let columns: Vec<&str> = meta.fields().iter().map(|f| f.column.as_str()).collect();
    assert_eq!(
        columns,
        ["id", "team_id", "first_name", "last_name", "part", "age"]
    );
    assert_eq!(meta.pk().column, "id");
    assert!(matches!(meta.pk().kind, FieldKind::Serial));
    assert!(meta.field("team_id").unwrap().null);
    assert_eq!(meta.field("age").unwrap().default, Some(Value::Int(16)));
    assert_eq!(
        meta.field("first_name").unwrap().default,
        Some(Value::from("unknown"))
    );
}

#[test]
fn test_table_not_found() {
    let db = Database::open(SqliteBackend::memory().unwrap(), common::team_registry(), false)
        .unwrap();
    let err = db.objects("Team").unwrap_err();
    assert!(matches!(err, MacaronError::TableNotFound(ref t) if t == "team"));
}

#[test]
fn test_table_already_exists() {
    let db = common::teams();
    let err = db.create_table("Team").unwrap_err();
    assert!(matches!(err, MacaronError::TableAlreadyExists(ref t) if t == "team"));
}

#[test]
fn test_undeclared_columns_are_reflected() {
    let exec = SqliteBackend::memory().unwrap();
    exec.execute(
        "CREATE TABLE legacy (id INTEGER PRIMARY KEY, code VARCHAR(8) NOT NULL DEFAULT 'x', score REAL)",
        &[],
    )
    .unwrap();
    let mut registry = Registry::new();
    registry
        .register(ModelDef::builder("Legacy").build().unwrap())
        .unwrap();
    let db = Database::open(exec, registry, false).unwrap();

    let legacy = db.objects("Legacy").unwrap();
    let record = legacy.create(kwargs! { "score" => 2.5 }).unwrap();
    assert_eq!(record.get("code").unwrap(), &Value::from("x"));
    assert_eq!(record.get("score").unwrap(), &Value::Float(2.5));
    let code = db.meta("Legacy").unwrap().field("code").unwrap().clone();
    assert!(!code.user_defined);
    assert_eq!(code.max_length, Some(8));
}

#[test]
fn test_create_link_tables() {
    let mut registry = Registry::new();
    registry
        .register(ModelDef::builder("Movie").build().unwrap())
        .unwrap();
    registry
        .register(
            ModelDef::builder("Member")
                .field(FieldDef::char("curename"))
                .many_to_many(ManyToMany::new("movies", "Movie"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let db = Database::open(SqliteBackend::memory().unwrap(), registry, false).unwrap();
    db.create_table("Movie").unwrap();
    db.create_table("Member").unwrap();
    let links = db.create_link_tables("Member").unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].table(), "membermovielink");
    let columns: Vec<&str> = links[0].fields().iter().map(|f| f.column.as_str()).collect();
    assert_eq!(columns, ["id", "member_id", "movie_id"]);

    let movie = db.objects("Movie").unwrap().create(kwargs! {}).unwrap();
    let member = db
        .objects("Member")
        .unwrap()
        .create(kwargs! { "curename" => "Cure Bloom" })
        .unwrap();
    member
        .many_to_many("movies")
        .unwrap()
        .append(&movie, kwargs! {})
        .unwrap();
    assert_eq!(movie.many_to_many("member_set").unwrap().count().unwrap(), 1);
}

#[test]
fn test_lazy_connection_creates_file_on_first_statement() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("macaron.db");
    let db = Database::open(
        SqliteBackend::open_lazy(&path, true),
        common::team_registry(),
        true,
    )
    .unwrap();
    db.commit().unwrap();
    db.rollback().unwrap();
    assert!(!path.exists());

    db.create_table("Team").unwrap();
    assert!(path.exists());
    db.objects("Team")
        .unwrap()
        .create(kwargs! { "name" => "Fresh" })
        .unwrap();
    db.close().unwrap();
    assert!(!db.is_open());

    let reopened = Database::open(
        SqliteBackend::open(&path, true).unwrap(),
        common::team_registry(),
        false,
    )
    .unwrap();
    assert_eq!(reopened.objects("Team").unwrap().count().unwrap(), 1);
}

#[test]
fn test_close_without_autocommit_discards_pending_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("macaron.db");
    {
        let db = Database::open(
            SqliteBackend::open(&path, true).unwrap(),
            common::team_registry(),
            false,
        )
        .unwrap();
        db.create_table("Team").unwrap();
        db.objects("Team")
            .unwrap()
            .create(kwargs! { "name" => "Heartcatch" })
            .unwrap();
        db.close().unwrap();
        assert!(matches!(
            db.query("SELECT 1", &[]),
            Err(MacaronError::OperationalError(_))
        ));
    }
    let reopened = Database::open(
        SqliteBackend::open(&path, true).unwrap(),
        common::team_registry(),
        false,
    )
    .unwrap();
    assert_eq!(reopened.objects("Team").unwrap().count().unwrap(), 0);
}

#[test]
fn test_drop_commits_in_autocommit_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("macaron.db");
    {
        let db = Database::open(
            SqliteBackend::open(&path, true).unwrap(),
            common::team_registry(),
            true,
        )
        .unwrap();
        db.create_table("Team").unwrap();
        db.objects("Team")
            .unwrap()
            .create(kwargs! { "name" => "Suite" })
            .unwrap();
    }
    let reopened = Database::open(
        SqliteBackend::open(&path, true).unwrap(),
        common::team_registry(),
        false,
    )
    .unwrap();
    assert_eq!(reopened.objects("Team").unwrap().count().unwrap(), 1);
}
