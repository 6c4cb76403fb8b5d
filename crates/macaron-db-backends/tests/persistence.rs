//! Create, save, delete and relationship access against SQLite.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use macaron_core::{MacaronError, MacaronResult};
use macaron_db::fields::FieldDef;
use macaron_db::model::{ModelDef, ModelHooks};
use macaron_db::transactions::atomic;
use macaron_db::{kwargs, Database, Record, Registry, Value};
use pretty_assertions::assert_eq;
use regex::Regex;

#[test]
fn test_reverse_append_validates_and_binds_owner() {
    let db = common::teams();
    let team = db
        .objects("Team")
        .unwrap()
        .create([("name", "Splash Star")])
        .unwrap();
    let members = team.reverse("members").unwrap();

    let err = members
        .append(kwargs! { "first_name" => "Saki", "last_name" => "Hyuuga", "age" => 19 })
        .unwrap_err();
    match err {
        MacaronError::ValidationError(ve) => {
            assert!(ve.message.starts_with("Member.age"), "{}", ve.message);
        }
        other => panic!("expected a validation error, got {other:?}"),
    }

    let saki = members
        .append(kwargs! { "first_name" => "Saki", "last_name" => "Hyuuga", "age" => 16 })
        .unwrap();
    assert_eq!(saki.get("team_id").unwrap(), team.pk());
    assert_eq!(saki.get_related("team").unwrap().unwrap(), team);

    let mut members = team.reverse("members").unwrap();
    let all = members.fetch_all().unwrap();
    assert_eq!(all, vec![saki]);
}

#[test]
fn test_defaults_come_from_table() {
    let db = common::teams();
    let member = db
        .objects("Member")
        .unwrap()
        .create(Vec::<(&str, Value)>::new())
        .unwrap();
    assert_eq!(member.get_as::<String>("first_name").unwrap(), "unknown");
    assert_eq!(member.get_as::<String>("last_name").unwrap(), "noname");
    assert_eq!(member.get_as::<i64>("age").unwrap(), 16);
    assert_eq!(member.get("team_id").unwrap(), &Value::Null);
    assert_eq!(member.get_related("team").unwrap(), None);
}

#[test]
fn test_unique_together_is_integrity_error() {
    let db = common::teams();
    let members = db.objects("Member").unwrap();
    members
        .create(kwargs! { "first_name" => "Nagisa", "last_name" => "Misumi" })
        .unwrap();
    let err = members
        .create(kwargs! { "first_name" => "Nagisa", "last_name" => "Misumi" })
        .unwrap_err();
    assert!(err.is_integrity(), "{err}");
}

#[test]
fn test_atomic_rolls_back_on_integrity_error() {
    let db = common::teams();
    db.commit().unwrap();
    let result = atomic(&db, |db| {
        let members = db.objects("Member")?;
        members.create(kwargs! { "first_name" => "Honoka", "last_name" => "Yukishiro" })?;
        members.create(kwargs! { "first_name" => "Honoka", "last_name" => "Yukishiro" })
    });
    assert!(result.unwrap_err().is_integrity());
    assert_eq!(db.objects("Member").unwrap().count().unwrap(), 0);

    atomic(&db, |db| {
        db.objects("Member")?
            .create(kwargs! { "first_name" => "Hikari" })
    })
    .unwrap();
    db.rollback().unwrap();
    assert_eq!(db.objects("Member").unwrap().count().unwrap(), 1);
}

#[test]
fn test_save_refresh_and_delete() {
    let db = common::teams();
    let members = db.objects("Member").unwrap();
    let mut nagisa = members
        .create(kwargs! { "first_name" => "Nagisa", "age" => 15 })
        .unwrap();
    nagisa.set("age", 16).unwrap();
    nagisa.save().unwrap();
    assert_eq!(members.get_by_pk(nagisa.pk().clone()).unwrap().get_as::<i64>("age").unwrap(), 16);

    let err = nagisa.set("age", 30).unwrap_err();
    assert!(matches!(err, MacaronError::ValidationError(_)));
    assert_eq!(nagisa.get_as::<i64>("age").unwrap(), 16);

    let mut copy = members.get_by_pk(nagisa.pk().clone()).unwrap();
    nagisa.set("part", "black").unwrap();
    nagisa.save().unwrap();
    copy.refresh().unwrap();
    assert_eq!(copy.get_as::<String>("part").unwrap(), "black");

    assert_eq!(nagisa.delete().unwrap(), 1);
    assert!(matches!(
        members.get_by_pk(nagisa.pk().clone()),
        Err(MacaronError::DoesNotExist(_))
    ));
    assert!(matches!(copy.save(), Err(MacaronError::DoesNotExist(_))));
}

#[test]
fn test_primary_key_change_updates_original_row() {
    let db = common::teams();
    let members = db.objects("Member").unwrap();
    let mut member = members.create(kwargs! { "first_name" => "Mai" }).unwrap();
    let old = member.pk().clone();
    member.set("id", 100).unwrap();
    member.save().unwrap();
    assert_eq!(member.pk(), &Value::Int(100));
    assert!(members.get_by_pk(old).is_err());
    assert_eq!(members.count().unwrap(), 1);
}

#[test]
fn test_get_errors() {
    let db = common::teams();
    let members = db.objects("Member").unwrap();
    members.create(kwargs! { "first_name" => "a", "age" => 15 }).unwrap();
    members.create(kwargs! { "first_name" => "b", "age" => 15 }).unwrap();

    let err = members.get([("first_name", "z")]).unwrap_err();
    match err {
        MacaronError::DoesNotExist(msg) => {
            assert_eq!(msg, "Member matching query does not exist.");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        members.get([("age", 15)]),
        Err(MacaronError::MultipleObjectsReturned(_))
    ));
}

#[test]
fn test_query_delete_counts_matching_rows() {
    let db = common::teams();
    let members = db.objects("Member").unwrap();
    for (first, age) in [("a", 15), ("b", 16), ("c", 17), ("d", 18)] {
        members
            .create(kwargs! { "first_name" => first, "age" => age })
            .unwrap();
    }
    let deleted = members.filter([("age__ge", 17)]).unwrap().delete().unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(members.count().unwrap(), 2);
    assert_eq!(members.all().delete().unwrap(), 2);
    assert_eq!(members.count().unwrap(), 0);
}

#[test]
fn test_related_type_checks() {
    let db = common::precure();
    let group = db
        .objects("Group")
        .unwrap()
        .create([("name", "Max Heart")])
        .unwrap();
    let movie = db
        .objects("Movie")
        .unwrap()
        .create([("title", "Splash Star")])
        .unwrap();
    let mut member = db
        .objects("Member")
        .unwrap()
        .create([("curename", "Cure Black")])
        .unwrap();

    let err = member.set_related("mygroup", Some(&movie)).unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));

    member.set_related("mygroup", Some(&group)).unwrap();
    member.save().unwrap();
    assert_eq!(member.get_related("mygroup").unwrap(), Some(group.clone()));
    member.set_related("mygroup", None).unwrap();
    assert_eq!(member.get_related("mygroup").unwrap(), None);

    let err = member
        .many_to_many("movies")
        .unwrap()
        .append(&group, kwargs! {})
        .unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));
}

#[test]
fn test_relation_names_refuse_bare_keys() {
    let db = common::precure();
    let group = db
        .objects("Group")
        .unwrap()
        .create([("name", "Max Heart")])
        .unwrap();
    let movie = db
        .objects("Movie")
        .unwrap()
        .create([("title", "Splash Star")])
        .unwrap();
    let members = db.objects("Member").unwrap();

    let err = members
        .create([
            ("curename", Value::from("Cure Black")),
            ("mygroup", movie.pk().clone()),
        ])
        .unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(ref m) if m.contains("mygroup_id")));
    assert_eq!(members.count().unwrap(), 0);

    let mut black = members
        .create([
            ("curename", Value::from("Cure Black")),
            ("mygroup_id", group.pk().clone()),
        ])
        .unwrap();
    let err = black.set("mygroup", movie.pk().clone()).unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));
    assert_eq!(black.get("mygroup_id").unwrap(), group.pk());
    assert_eq!(black.get_related("mygroup").unwrap(), Some(group.clone()));

    let err = members.filter([("mygroup", &movie)]).unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));
    let err = members.filter([("curename", &group)]).unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));
    assert_eq!(
        members
            .filter([("mygroup_id", &group)])
            .unwrap()
            .count()
            .unwrap(),
        1
    );

    let err = black
        .many_to_many("movies")
        .unwrap()
        .pop(Some(&group))
        .unwrap_err();
    assert!(matches!(err, MacaronError::TypeError(_)));
}

#[test]
fn test_many_to_many_append_pop_clear() {
    let db = common::precure();
    let movies = db.objects("Movie").unwrap();
    let first = movies.create([("title", "DX")]).unwrap();
    let second = movies.create([("title", "DX2")]).unwrap();
    let member = db
        .objects("Member")
        .unwrap()
        .create([("curename", "Cure Black")])
        .unwrap();
    let links = member.many_to_many("movies").unwrap();

    links.append(&first, kwargs! {}).unwrap();
    links.append(&first, kwargs! {}).unwrap();
    links.append(&second, kwargs! {}).unwrap();
    assert_eq!(db.objects("MemberMovieLink").unwrap().count().unwrap(), 3);
    assert_eq!(links.count().unwrap(), 3);

    let mut casts = first.many_to_many("members").unwrap();
    assert_eq!(casts.fetch_all().unwrap(), vec![member.clone(), member.clone()]);

    assert_eq!(links.pop(Some(&first)).unwrap(), 2);
    let mut remaining = member.many_to_many("movies").unwrap();
    let titles: Vec<String> = remaining
        .fetch_all()
        .unwrap()
        .iter()
        .map(|m| m.get_as("title").unwrap())
        .collect();
    assert_eq!(titles, ["DX2"]);

    assert_eq!(links.clear().unwrap(), 1);
    assert_eq!(links.count().unwrap(), 0);
}

#[test]
fn test_reverse_of_deep_relation() {
    let db = common::precure();
    let series = db
        .objects("Series")
        .unwrap()
        .create([("name", "Yes! Pretty Cure 5")])
        .unwrap();
    let groups = series.reverse("groups").unwrap();
    groups.append([("name", "Yes! 5")]).unwrap();
    groups.append([("name", "Yes! 5 GoGo!")]).unwrap();
    assert_eq!(series.reverse("groups").unwrap().count().unwrap(), 2);

    let movie = db
        .objects("Movie")
        .unwrap()
        .create([("title", "Kagami no Kuni")])
        .unwrap();
    movie
        .reverse("subtitles")
        .unwrap()
        .append([("title", "Miracle Adventure")])
        .unwrap();
    let subtitle = db
        .objects("SubTitle")
        .unwrap()
        .get([("movie__title", "Kagami no Kuni")])
        .unwrap();
    assert_eq!(subtitle.get_related("movie").unwrap(), Some(movie));
}

fn kinds_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            ModelDef::builder("Sample")
                .field(FieldDef::integer("count"))
                .field(FieldDef::float("ratio"))
                .field(FieldDef::char("label").max_length(10))
                .field(FieldDef::text("body").null(true))
                .field(FieldDef::boolean("flag"))
                .field(FieldDef::timestamp("at").null(true))
                .field(FieldDef::date("day").null(true))
                .field(FieldDef::time("clock").null(true))
                .field(FieldDef::json("doc").null(true))
                .field(
                    FieldDef::matching("curename", Regex::new("Cure .+$").unwrap())
                        .max_length(30)
                        .null(true),
                )
                .field(FieldDef::timestamp_at_create("created"))
                .field(FieldDef::timestamp_at_save("modified"))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
}

#[test]
fn test_every_kind_round_trips() {
    let db = common::database(kinds_registry());
    let day = NaiveDate::from_ymd_opt(2004, 2, 1).unwrap();
    let at = day.and_hms_micro_opt(8, 30, 0, 250_000).unwrap();
    let clock = NaiveTime::from_hms_opt(7, 45, 30).unwrap();
    let doc = serde_json::json!({"Macaron": "Good!", "n": [1, 2]});

    let sample = db
        .objects("Sample")
        .unwrap()
        .create(kwargs! {
            "count" => 3,
            "ratio" => 0.5,
            "label" => "macaron",
            "flag" => true,
            "at" => at,
            "day" => day,
            "clock" => clock,
            "doc" => doc.clone(),
            "curename" => "Cure Lemonade",
        })
        .unwrap();

    let mut stored = db.objects("Sample").unwrap().get_by_pk(sample.pk().clone()).unwrap();
    assert_eq!(stored, sample);
    assert_eq!(stored.get("count").unwrap(), &Value::Int(3));
    assert_eq!(stored.get("ratio").unwrap(), &Value::Float(0.5));
    assert_eq!(stored.get("label").unwrap(), &Value::from("macaron"));
    assert_eq!(stored.get("body").unwrap(), &Value::Null);
    assert_eq!(stored.get("flag").unwrap(), &Value::Bool(true));
    assert_eq!(stored.get("at").unwrap(), &Value::DateTime(at));
    assert_eq!(stored.get("day").unwrap(), &Value::Date(day));
    assert_eq!(stored.get("clock").unwrap(), &Value::Time(clock));
    assert_eq!(stored.get("doc").unwrap(), &Value::Json(doc));
    assert!(matches!(stored.get("created").unwrap(), Value::DateTime(_)));

    let created = stored.get("created").unwrap().clone();
    stored.set("flag", false).unwrap();
    stored.save().unwrap();
    assert_eq!(stored.get("created").unwrap(), &created);
    assert_eq!(stored.get("flag").unwrap(), &Value::Bool(false));
    assert!(matches!(stored.get("modified").unwrap(), Value::DateTime(_)));

    let raw = db
        .query("SELECT \"doc\", \"flag\" FROM \"sample\"", &[])
        .unwrap();
    assert_eq!(
        raw[0].get::<String>("doc").unwrap(),
        r#"{"Macaron":"Good!","n":[1,2]}"#
    );
    assert_eq!(raw[0].get::<i64>("flag").unwrap(), 0);
}

#[test]
fn test_matching_field_rejects() {
    let db = common::database(kinds_registry());
    let err = db
        .objects("Sample")
        .unwrap()
        .create(kwargs! {
            "count" => 1, "ratio" => 1.0, "label" => "x", "flag" => false,
            "curename" => "Shiny Luminous",
        })
        .unwrap_err();
    assert!(matches!(err, MacaronError::ValidationError(_)));
    assert_eq!(db.objects("Sample").unwrap().count().unwrap(), 0);
}

static DELETED: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Shout;

impl ModelHooks for Shout {
    fn before_create(&self, record: &mut Record) -> MacaronResult<()> {
        let name: String = record.get_as("name")?;
        record.set("name", name.to_uppercase())
    }

    fn before_save(&self, record: &mut Record) -> MacaronResult<()> {
        let name: String = record.get_as("name")?;
        if name.is_empty() {
            return Err(MacaronError::InvalidQuery("name must not be empty".into()));
        }
        Ok(())
    }

    fn after_delete(&self, _record: &Record) -> MacaronResult<()> {
        DELETED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_hooks_run_around_writes() {
    let mut registry = Registry::new();
    registry
        .register(
            ModelDef::builder("Shout")
                .field(FieldDef::char("name").max_length(20))
                .hooks(Shout)
                .build()
                .unwrap(),
        )
        .unwrap();
    let db = common::database(registry);
    let shouts = db.objects("Shout").unwrap();
    let mut record = shouts.create([("name", "macaron")]).unwrap();
    assert_eq!(record.get_as::<String>("name").unwrap(), "MACARON");

    record.set("name", "").unwrap();
    assert!(matches!(record.save(), Err(MacaronError::InvalidQuery(_))));
    record.refresh().unwrap();
    assert_eq!(record.get_as::<String>("name").unwrap(), "MACARON");

    record.delete().unwrap();
    assert_eq!(DELETED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_database_handle_is_shared() {
    let db = common::teams();
    let clone: Database = db.clone();
    clone
        .objects("Team")
        .unwrap()
        .create([("name", "Fresh")])
        .unwrap();
    assert_eq!(db.objects("Team").unwrap().count().unwrap(), 1);
    assert!(Arc::ptr_eq(
        &db.meta("Team").unwrap(),
        &clone.meta("Team").unwrap()
    ));
}
