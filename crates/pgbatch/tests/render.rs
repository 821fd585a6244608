//! Byte-for-byte rendering tests: no database needed, every assertion is on
//! the SQL text a batch would put on the wire.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use pgbatch::{
    Batch, BatchError, BatchResult, Connection, FieldCodec, FieldProbe, Record, SortDir, Value,
};
use tokio_postgres::Row;

#[derive(Record, Default, Clone)]
struct TestStruct {
    #[db("primary_key")]
    id: i64,
    a: i64,
    b: i64,
}

#[derive(Record, Default)]
struct CreatedUpdated {
    #[db("primary_key")]
    id: i64,
    #[db("created")]
    created_at: NaiveDateTime,
    #[db("updated")]
    updated_at: NaiveDateTime,
}

#[derive(Record, Default)]
struct Foo {
    a: i64,
    b: i64,
}

#[derive(Record, Default)]
struct NoKeys {
    a: i64,
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 12, 12, 12, 12, 12).unwrap()
}

fn zero_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A connection for tests that must fail before any I/O happens.
struct Unreachable;

impl Connection for Unreachable {
    async fn exec(&self, _sql: &str) -> BatchResult<()> {
        panic!("exec must not be reached");
    }

    async fn query(&self, _sql: &str) -> BatchResult<Vec<Row>> {
        panic!("query must not be reached");
    }
}

#[test]
fn single_insert() {
    let mut b = Batch::new();
    b.insert(&mut TestStruct { id: 1, a: 111, b: 1111 });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 111, 1111) RETURNING NOTHING"#
    );
}

#[test]
fn bulk_insert() {
    let mut rows = vec![
        TestStruct { id: 1, a: 111, b: 1111 },
        TestStruct { id: 2, a: 222, b: 2222 },
        TestStruct { id: 3, a: 333, b: 3333 },
    ];
    let mut b = Batch::new();
    b.insert_many(&mut rows);
    assert_eq!(
        b.render(),
        r#"INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 111, 1111), (2, 222, 2222), (3, 333, 3333) RETURNING NOTHING"#
    );
}

#[test]
fn bulk_insert_empty_is_noop() {
    let mut b = Batch::new();
    b.insert_many::<TestStruct>(&mut []);
    assert_eq!(b.render(), "");

    b.insert(&mut TestStruct { id: 1, a: 2, b: 3 });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 2, 3) RETURNING NOTHING"#
    );
}

#[test]
fn bulk_upsert_into_custom_table() {
    let mut rows = vec![TestStruct { id: 1, a: 2, b: 3 }];
    let mut b = Batch::new();
    b.upsert_many_into(&mut rows, "archive");
    assert_eq!(
        b.render(),
        r#"UPSERT INTO "archive" ("id", "a", "b") VALUES (1, 2, 3) RETURNING NOTHING"#
    );
}

#[test]
fn statements_join_with_semicolons() {
    let mut b = Batch::new();
    b.insert(&mut TestStruct { id: 1, a: 1, b: 1 })
        .upsert(&mut TestStruct { id: 2, a: 2, b: 2 });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 1, 1) RETURNING NOTHING; UPSERT INTO "test_struct" ("id", "a", "b") VALUES (2, 2, 2) RETURNING NOTHING"#
    );
}

#[test]
fn transaction_wrap() {
    let mut b = Batch::new();
    b.transaction();
    b.insert(&mut TestStruct { id: 1, a: 1, b: 1 });
    b.delete(&TestStruct { id: 1, a: 1, b: 1 });
    assert_eq!(
        b.render(),
        r#"BEGIN; INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 1, 1) RETURNING NOTHING; DELETE FROM "test_struct" WHERE "id" = 1 RETURNING NOTHING; COMMIT"#
    );
}

#[test]
fn created_updated_stamping_on_insert() {
    let mut b = Batch::new();
    b.set_now_fn(fixed_now);
    b.insert(&mut CreatedUpdated {
        id: 1,
        ..Default::default()
    });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "created_updated" ("id", "created_at", "updated_at") VALUES (1, '2012-12-12 12:12:12', '2012-12-12 12:12:12') RETURNING NOTHING"#
    );
}

#[test]
fn update_stamps_only_updated() {
    let mut rec = CreatedUpdated {
        id: 1,
        created_at: zero_time(),
        updated_at: zero_time(),
    };
    let mut b = Batch::new();
    b.set_now_fn(fixed_now);
    b.update(&mut rec);
    assert_eq!(
        b.render(),
        r#"UPDATE "created_updated" SET "created_at" = '0001-01-01 00:00:00', "updated_at" = '2012-12-12 12:12:12' WHERE "id" = 1 RETURNING NOTHING"#
    );
}

#[test]
fn stamping_writes_back_into_the_record() {
    let mut rec = CreatedUpdated::default();
    let mut b = Batch::new();
    b.set_now_fn(fixed_now);
    b.insert(&mut rec);
    assert_eq!(rec.created_at, fixed_now().naive_utc());
    assert_eq!(rec.updated_at, fixed_now().naive_utc());
}

#[test]
fn select_composition() {
    let mut out1 = CreatedUpdated::default();
    let mut out2 = CreatedUpdated::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out1).filter_fmt("id = ?", [1]));
    b.select(b.query().into_one(&mut out2).filter_fmt("id = ?", [2]));
    assert_eq!(
        b.render(),
        r#"SELECT "id", "created_at", "updated_at" FROM "created_updated" WHERE id = 1 LIMIT 1; SELECT "id", "created_at", "updated_at" FROM "created_updated" WHERE id = 2 LIMIT 1"#
    );
}

#[test]
fn select_with_order_limit_offset() {
    let mut out = Vec::<CreatedUpdated>::new();
    let mut b = Batch::new();
    b.select(
        b.query()
            .into_many(&mut out)
            .filter_fmt("id > ?", [1])
            .order_by("created_at", SortDir::Desc)
            .limit(10)
            .offset(5),
    );
    assert_eq!(
        b.render(),
        r#"SELECT "id", "created_at", "updated_at" FROM "created_updated" WHERE id > 1 ORDER BY "created_at" DESC LIMIT 10 OFFSET 5"#
    );
}

#[test]
fn select_single_gets_implicit_limit() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out));
    assert_eq!(b.render(), r#"SELECT "a", "b" FROM "foo" LIMIT 1"#);
}

#[test]
fn select_slice_has_no_implicit_limit() {
    let mut out = Vec::<Foo>::new();
    let mut b = Batch::new();
    b.select(b.query().into_many(&mut out));
    assert_eq!(b.render(), r#"SELECT "a", "b" FROM "foo""#);
}

#[test]
fn select_explicit_limit_is_kept() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out).limit(10));
    assert_eq!(b.render(), r#"SELECT "a", "b" FROM "foo" LIMIT 10"#);
}

#[test]
fn select_multiple_filters_join_with_and() {
    let mut out = Vec::<Foo>::new();
    let mut b = Batch::new();
    b.select(
        b.query()
            .into_many(&mut out)
            .filter_fmt("a = ?", [1])
            .filter_fmt("b in (?)", [vec![2i64, 3]]),
    );
    assert_eq!(
        b.render(),
        r#"SELECT "a", "b" FROM "foo" WHERE a = 1 AND b in (2, 3)"#
    );
}

#[test]
fn select_custom_table() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().table("bar").into_one(&mut out));
    assert_eq!(b.render(), r#"SELECT "a", "b" FROM "bar" LIMIT 1"#);
}

#[test]
fn select_with_prefix() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().prefix("p").into_one(&mut out));
    assert_eq!(b.render(), r#"SELECT p."a", p."b" FROM "foo" AS p LIMIT 1"#);
}

#[test]
fn select_primitive_with_projection() {
    let mut count = 0i64;
    let mut b = Batch::new();
    b.select(
        b.query()
            .table("foo")
            .fields(["count(*)"])
            .into_value(&mut count),
    );
    assert_eq!(b.render(), r#"SELECT count(*) FROM "foo" LIMIT 1"#);
}

#[test]
fn select_primitive_slice_with_order() {
    let mut ids = Vec::<i64>::new();
    let mut b = Batch::new();
    b.select(
        b.query()
            .table("foo")
            .fields(["a"])
            .into_values(&mut ids)
            .order_by("a", SortDir::Asc),
    );
    // no schema to check against: the order column is quoted and trusted
    assert_eq!(b.render(), r#"SELECT a FROM "foo" ORDER BY "a" ASC"#);
}

#[test]
fn raw_template_expansion() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out).raw_fmt(
        "SELECT :columns: FROM :table: WHERE a = ? AND b = ?",
        [5, 10],
    ));
    assert_eq!(b.render(), r#"SELECT "a", "b" FROM "foo" WHERE a = 5 AND b = 10"#);
}

#[test]
fn raw_template_leaves_unknown_markers() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(
        b.query()
            .into_one(&mut out)
            .raw("SELECT :columns: FROM :table: WHERE x = ':marker:'"),
    );
    assert_eq!(
        b.render(),
        r#"SELECT "a", "b" FROM "foo" WHERE x = ':marker:'"#
    );
}

#[test]
fn delete_by_record() {
    let mut b = Batch::new();
    b.delete(&TestStruct { id: 7, a: 0, b: 0 });
    assert_eq!(
        b.render(),
        r#"DELETE FROM "test_struct" WHERE "id" = 7 RETURNING NOTHING"#
    );
}

#[test]
fn delete_matching_query() {
    let mut b = Batch::new();
    let q = b
        .query()
        .table("sessions")
        .filter_fmt("expires_at < ?", [zero_time()]);
    b.delete_matching(q);
    assert_eq!(
        b.render(),
        r#"DELETE FROM "sessions" WHERE expires_at < '0001-01-01 00:00:00' RETURNING NOTHING"#
    );
}

#[test]
fn raw_statement() {
    let mut b = Batch::new();
    b.raw_fmt("DELETE FROM t WHERE id = ?", [3]);
    assert_eq!(b.render(), "DELETE FROM t WHERE id = 3");
}

#[test]
#[should_panic(expected = "no primary key")]
fn update_without_primary_keys_panics() {
    let mut b = Batch::new();
    b.update(&mut NoKeys { a: 1 });
}

#[test]
#[should_panic(expected = "no primary key")]
fn delete_without_primary_keys_panics() {
    let mut b = Batch::new();
    b.delete(&NoKeys { a: 1 });
}

#[test]
#[should_panic(expected = "unknown column")]
fn unknown_order_by_column_panics() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out).order_by("nope", SortDir::Asc));
}

#[test]
#[should_panic(expected = "no destination")]
fn select_without_destination_panics() {
    let mut b = Batch::new();
    b.select(b.query().table("foo"));
}

#[test]
#[should_panic(expected = "table must be specified explicitly")]
fn primitive_without_table_panics() {
    let mut count = 0i64;
    let mut b = Batch::new();
    b.select(b.query().fields(["count(*)"]).into_value(&mut count));
}

#[test]
#[should_panic(expected = "primitive destination")]
fn projection_with_record_destination_panics() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().table("foo").fields(["a"]).into_one(&mut out));
}

#[tokio::test]
#[should_panic(expected = "both reads and writes")]
async fn mixed_batch_panics_at_run() {
    let mut out = Foo::default();
    let mut b = Batch::new();
    b.insert(&mut TestStruct { id: 1, a: 1, b: 1 });
    b.select(b.query().into_one(&mut out));
    let _ = b.run(&Unreachable).await;
}

#[tokio::test]
#[should_panic(expected = "uncommitted builders")]
async fn pending_query_builder_panics_at_run() {
    let mut b = Batch::new();
    let _pending = b.query();
    b.insert(&mut TestStruct { id: 1, a: 1, b: 1 });
    let _ = b.run(&Unreachable).await;
}

#[test]
fn default_tagged_fields() {
    #[derive(Record, Default)]
    struct WithDefault {
        #[db("primary_key")]
        id: i64,
        #[db("default")]
        seq: i64,
    }

    let mut b = Batch::new();
    b.insert(&mut WithDefault { id: 1, seq: 42 });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "with_default" ("id", "seq") VALUES (1, DEFAULT) RETURNING NOTHING"#
    );

    // UPSERT emits the value
    let mut b = Batch::new();
    b.upsert(&mut WithDefault { id: 1, seq: 42 });
    assert_eq!(
        b.render(),
        r#"UPSERT INTO "with_default" ("id", "seq") VALUES (1, 42) RETURNING NOTHING"#
    );
}

#[test]
fn column_override_and_skip() {
    #[derive(Record, Default)]
    struct Renamed {
        #[db("column:key,primary_key")]
        id: i64,
        #[db("-")]
        scratch: i64,
        display_name: String,
    }

    let mut b = Batch::new();
    b.insert(&mut Renamed {
        id: 1,
        scratch: 99,
        display_name: "x".into(),
    });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "renamed" ("key", "display_name") VALUES (1, 'x') RETURNING NOTHING"#
    );
}

#[test]
fn nullable_fields_render_null() {
    #[derive(Record, Default)]
    struct Maybe {
        #[db("primary_key")]
        id: i64,
        note: Option<String>,
        score: Option<f64>,
    }

    let mut b = Batch::new();
    b.insert(&mut Maybe {
        id: 1,
        note: None,
        score: Some(f64::NAN),
    });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "maybe" ("id", "note", "score") VALUES (1, NULL, 'NaN'::FLOAT) RETURNING NOTHING"#
    );
}

#[test]
fn insert_into_custom_table() {
    let mut b = Batch::new();
    b.insert_into(&mut TestStruct { id: 1, a: 2, b: 3 }, "other");
    assert_eq!(
        b.render(),
        r#"INSERT INTO "other" ("id", "a", "b") VALUES (1, 2, 3) RETURNING NOTHING"#
    );
}

#[test]
fn dynamic_value_fields() {
    #[derive(Record, Default)]
    struct Payload {
        #[db("primary_key")]
        id: i64,
        body: Value,
    }

    let mut b = Batch::new();
    b.insert(&mut Payload {
        id: 1,
        body: Value::from("text"),
    })
    .insert(&mut Payload {
        id: 2,
        body: Value::from(2.5),
    })
    .insert(&mut Payload {
        id: 3,
        body: Value::Null,
    });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "payload" ("id", "body") VALUES (1, 'text') RETURNING NOTHING; INSERT INTO "payload" ("id", "body") VALUES (2, 2.5) RETURNING NOTHING; INSERT INTO "payload" ("id", "body") VALUES (3, NULL) RETURNING NOTHING"#
    );
}

#[test]
fn codec_resolver_overrides_emission() {
    #[derive(Record, Default)]
    struct Secretive {
        #[db("primary_key")]
        id: i64,
        secret: String,
    }

    let mut b = Batch::new();
    b.set_codec_resolver(Arc::new(|probe: &FieldProbe<'_>| {
        if probe.record == "secretive" && probe.field == "secret" {
            Some(FieldCodec {
                emit: Box::new(|_, buf| buf.push_str("'<redacted>'")),
                get: Box::new(|_| Value::Null),
                scan: Box::new(|_, _, _| Ok(())),
                set: Box::new(|_, _| {}),
            })
        } else {
            None
        }
    }));
    b.insert(&mut Secretive {
        id: 1,
        secret: "hunter2".into(),
    });
    assert_eq!(
        b.render(),
        r#"INSERT INTO "secretive" ("id", "secret") VALUES (1, '<redacted>') RETURNING NOTHING"#
    );
}

/// A connection whose reads all fail, for error-aggregation coverage.
struct FailingReads;

impl Connection for FailingReads {
    async fn exec(&self, _sql: &str) -> BatchResult<()> {
        panic!("exec must not be reached");
    }

    async fn query(&self, _sql: &str) -> BatchResult<Vec<Row>> {
        Err(BatchError::decode("col", "boom"))
    }
}

#[tokio::test]
async fn read_branch_errors_aggregate() {
    let mut out1 = Foo::default();
    let mut out2 = Foo::default();
    let mut b = Batch::new();
    b.select(b.query().into_one(&mut out1));
    b.select(b.query().into_one(&mut out2));
    match b.run(&FailingReads).await {
        Err(BatchError::Multi(m)) => assert_eq!(m.errors.len(), 2),
        other => panic!("expected MultiError, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_batch_runs_clean() {
    let b = Batch::new();
    b.run(&Unreachable).await.expect("empty batch should be a no-op");
}

#[test]
fn bulk_writer_incremental() {
    let mut b = Batch::new();
    let mut bulk = b.bulk_inserter::<TestStruct>();
    bulk.add(&mut TestStruct { id: 1, a: 111, b: 1111 })
        .add(&mut TestStruct { id: 2, a: 222, b: 2222 });
    bulk.add_many(&mut [TestStruct { id: 3, a: 333, b: 3333 }]);
    bulk.commit();
    assert_eq!(
        b.render(),
        r#"INSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 111, 1111), (2, 222, 2222), (3, 333, 3333) RETURNING NOTHING"#
    );
}

#[test]
fn bulk_writer_empty_commit_is_noop() {
    let mut b = Batch::new();
    let bulk = b.bulk_upserter::<TestStruct>();
    bulk.commit();
    assert_eq!(b.render(), "");
}

#[test]
fn with_bulk_upserter_closure() {
    let mut b = Batch::new();
    b.with_bulk_upserter::<TestStruct>(|bulk| {
        bulk.add(&mut TestStruct { id: 1, a: 2, b: 3 });
    });
    assert_eq!(
        b.render(),
        r#"UPSERT INTO "test_struct" ("id", "a", "b") VALUES (1, 2, 3) RETURNING NOTHING"#
    );
}

#[tokio::test]
#[should_panic(expected = "uncommitted builders")]
async fn dropped_bulk_writer_panics_at_run() {
    let mut b = Batch::new();
    let bulk = b.bulk_inserter::<TestStruct>();
    drop(bulk);
    b.insert(&mut TestStruct { id: 1, a: 1, b: 1 });
    let _ = b.run(&Unreachable).await;
}

#[test]
fn table_of_uses_record_name() {
    let mut ids = Vec::<i64>::new();
    let mut b = Batch::new();
    b.select(
        b.query()
            .table_of::<Foo>()
            .fields(["a"])
            .into_values(&mut ids),
    );
    assert_eq!(b.render(), r#"SELECT a FROM "foo""#);
}
