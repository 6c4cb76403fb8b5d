//! Shared fixtures for the SQLite integration tests.

#![allow(dead_code)]

use macaron_db::fields::FieldDef;
use macaron_db::model::{ManyToMany, ManyToOne, ModelDef, ReferentialAction};
use macaron_db::{Database, Registry};
use macaron_db_backends::SqliteBackend;

/// Series, Group, Movie, Member and SubTitle with every relationship shape.
pub fn precure_registry() -> Registry {
    let mut registry = Registry::new();
    let models = [
        ModelDef::builder("Series")
            .field(FieldDef::char("name").max_length(40))
            .build(),
        ModelDef::builder("Group")
            .field(FieldDef::char("name").max_length(40))
            .many_to_one(
                ManyToOne::new("series", "Series")
                    .nullable()
                    .related_name("groups"),
            )
            .build(),
        ModelDef::builder("Movie")
            .field(FieldDef::char("title").max_length(80))
            .build(),
        ModelDef::builder("Member")
            .field(FieldDef::char("curename").max_length(40))
            .many_to_one(
                ManyToOne::new("mygroup", "Group")
                    .nullable()
                    .related_name("mymembers"),
            )
            .many_to_one(
                ManyToOne::new("subgroup", "Group")
                    .nullable()
                    .related_name("submembers"),
            )
            .many_to_many(ManyToMany::new("movies", "Movie").related_name("members"))
            .field(FieldDef::date("joined").null(true))
            .build(),
        ModelDef::builder("SubTitle")
            .field(FieldDef::char("title").max_length(80))
            .many_to_one(
                ManyToOne::new("movie", "Movie")
                    .nullable()
                    .related_name("subtitles"),
            )
            .build(),
    ];
    for model in models {
        registry.register(model.unwrap()).unwrap();
    }
    registry
}

/// Team and Member with defaults, a bounded age and a unique name pair.
pub fn team_registry() -> Registry {
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
                .field(FieldDef::char("part").max_length(10).null(true))
                .field(FieldDef::integer("age").default(16).min(15.0).max(18.0))
                .unique_together(["first_name", "last_name"])
                .ordering(["-id"])
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
}

/// An in-memory database with a table for every registered model,
/// generated link models included.
pub fn database(registry: Registry) -> Database {
    let names: Vec<String> = registry.models().map(|m| m.name().to_string()).collect();
    let db = Database::open(SqliteBackend::memory().unwrap(), registry, false).unwrap();
    for name in &names {
        db.create_table(name).unwrap();
    }
    db
}

pub fn precure() -> Database {
    database(precure_registry())
}

pub fn teams() -> Database {
    database(team_registry())
}
