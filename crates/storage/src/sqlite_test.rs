use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use lodge_schema::{CompiledField, Field, FieldType, Record, Value};

use super::{SqliteConfig, SqliteStorage};
use crate::StorageDriver;
use crate::query::Query;

fn schema(fields: &[(&str, FieldType)]) -> Vec<CompiledField> {
    fields
        .iter()
        .map(|(name, kind)| Field::new(name, *kind).compile().unwrap())
        .collect()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn open_memory() -> SqliteStorage {
    SqliteStorage::open(SqliteConfig::memory()).await.unwrap()
}

/// Run a query and collect the NDJSON lines it produced.
async fn run_query(storage: &SqliteStorage, query: &Query) -> Vec<serde_json::Value> {
    let (tx, mut rx) = mpsc::channel::<Bytes>(1024);
    storage.query(tx, query).await.unwrap();

    let mut lines = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        lines.push(serde_json::from_str(text.trim_end()).unwrap());
    }
    lines
}

/// Write records through the async insert queue and wait until they land.
async fn write_and_wait(storage: &SqliteStorage, name: &str, records: Vec<Record>) {
    let expected = records.len();
    for r in records {
        storage.write(name, r).await;
    }

    for _ in 0..200 {
        let rows = run_query(storage, &Query::new(name)).await;
        if rows.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("inserts did not land within the deadline");
}

fn row(pairs: &[(&str, serde_json::Value)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    serde_json::Value::Object(map)
}

fn cursor(n: i64) -> serde_json::Value {
    serde_json::Value::String(format!("{n:016x}"))
}

// =========================================================================
// Migration
// =========================================================================

#[tokio::test]
async fn test_migrate_creates_table() {
    let storage = open_memory().await;
    let fields = schema(&[
        ("time", FieldType::Time),
        ("level", FieldType::String),
        ("message", FieldType::String),
    ]);

    storage.migrate("logs", &fields).await.unwrap();

    let conn = storage.db.connect().unwrap();
    let columns = SqliteStorage::table_columns(&conn, "logs").await.unwrap();
    assert_eq!(
        columns,
        vec![
            ("_cursor".to_string(), "INTEGER".to_string()),
            ("time".to_string(), "INTEGER".to_string()),
            ("level".to_string(), "TEXT".to_string()),
            ("message".to_string(), "TEXT".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_migrate_adds_missing_columns() {
    let storage = open_memory().await;
    let before = schema(&[
        ("timestamp", FieldType::Time),
        ("level", FieldType::String),
        ("message", FieldType::String),
    ]);
    storage.migrate("logs", &before).await.unwrap();

    let after = schema(&[
        ("timestamp", FieldType::Time),
        ("level", FieldType::String),
        ("message", FieldType::String),
        ("count", FieldType::Int),
        ("severity", FieldType::Int),
    ]);
    storage.migrate("logs", &after).await.unwrap();

    let conn = storage.db.connect().unwrap();
    let columns: HashMap<String, String> = SqliteStorage::table_columns(&conn, "logs")
        .await
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(columns.len(), 6); // 5 fields + _cursor
    assert_eq!(columns["count"], "INTEGER");
    assert_eq!(columns["severity"], "INTEGER");
    assert_eq!(columns["_cursor"], "INTEGER");
}

#[tokio::test]
async fn test_migrate_drops_removed_columns() {
    let storage = open_memory().await;
    let before = schema(&[
        ("time", FieldType::Time),
        ("level", FieldType::String),
        ("message", FieldType::String),
    ]);
    storage.migrate("logs", &before).await.unwrap();

    let after = schema(&[("time", FieldType::Time), ("message", FieldType::String)]);
    storage.migrate("logs", &after).await.unwrap();

    let conn = storage.db.connect().unwrap();
    let columns: HashMap<String, String> = SqliteStorage::table_columns(&conn, "logs")
        .await
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(columns.len(), 3);
    assert!(!columns.contains_key("level"));
}

#[tokio::test]
async fn test_migrate_retypes_column() {
    let storage = open_memory().await;
    let before = schema(&[("time", FieldType::Time), ("status", FieldType::String)]);
    storage.migrate("logs", &before).await.unwrap();

    let after = schema(&[("time", FieldType::Time), ("status", FieldType::Int)]);
    storage.migrate("logs", &after).await.unwrap();

    let conn = storage.db.connect().unwrap();
    let columns: HashMap<String, String> = SqliteStorage::table_columns(&conn, "logs")
        .await
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(columns["status"], "INTEGER");
}

// =========================================================================
// Insert path and cursor semantics
// =========================================================================

#[tokio::test]
async fn test_write_assigns_increasing_cursors() {
    let storage = open_memory().await;
    let fields = schema(&[("status", FieldType::Int)]);
    storage.migrate("t", &fields).await.unwrap();

    write_and_wait(
        &storage,
        "t",
        vec![
            record(&[("status", Value::Int(200))]),
            record(&[("status", Value::Int(404))]),
            record(&[("status", Value::Int(500))]),
        ],
    )
    .await;

    let rows = run_query(&storage, &Query::new("t")).await;
    let cursors: Vec<&str> = rows
        .iter()
        .map(|r| r["_cursor"].as_str().unwrap())
        .collect();
    assert_eq!(
        cursors,
        vec![
            "0000000000000001",
            "0000000000000002",
            "0000000000000003"
        ]
    );
}

#[tokio::test]
async fn test_round_trip_preserves_values() {
    let storage = open_memory().await;
    let fields = schema(&[
        ("time", FieldType::Time),
        ("count", FieldType::Int),
        ("ratio", FieldType::Float),
        ("message", FieldType::String),
    ]);
    storage.migrate("t", &fields).await.unwrap();

    write_and_wait(
        &storage,
        "t",
        vec![record(&[
            ("time", Value::Int(1672574400000)),
            ("count", Value::Int(123)),
            ("ratio", Value::Float(123.456)),
            ("message", Value::Str("Test message".to_string())),
        ])],
    )
    .await;

    let rows = run_query(&storage, &Query::new("t")).await;
    assert_eq!(
        rows,
        vec![row(&[
            ("_cursor", cursor(1)),
            ("time", 1672574400000i64.into()),
            ("count", 123.into()),
            ("ratio", 123.456.into()),
            ("message", "Test message".into()),
        ])]
    );
}

// =========================================================================
// Query: integers, cursors, limits
// =========================================================================

async fn status_fixture() -> SqliteStorage {
    let storage = open_memory().await;
    let fields = schema(&[("status", FieldType::Int)]);
    storage.migrate("t", &fields).await.unwrap();

    let statuses = [200, 404, 403, 500, 400];
    write_and_wait(
        &storage,
        "t",
        statuses
            .iter()
            .map(|s| record(&[("status", Value::Int(*s))]))
            .collect(),
    )
    .await;
    storage
}

fn status_row(cursor_id: i64, status: i64) -> serde_json::Value {
    row(&[("_cursor", cursor(cursor_id)), ("status", status.into())])
}

#[tokio::test]
async fn test_query_all() {
    let storage = status_fixture().await;
    let rows = run_query(&storage, &Query::new("t")).await;
    assert_eq!(
        rows,
        vec![
            status_row(1, 200),
            status_row(2, 404),
            status_row(3, 403),
            status_row(4, 500),
            status_row(5, 400),
        ]
    );
}

#[tokio::test]
async fn test_query_limit_takes_tail() {
    let storage = status_fixture().await;
    let mut q = Query::new("t");
    q.set_limit(3);

    // Default view is the tail: highest cursors, re-sorted ascending.
    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![status_row(3, 403), status_row(4, 500), status_row(5, 400)]
    );
}

#[tokio::test]
async fn test_query_after_cursor() {
    let storage = status_fixture().await;
    let mut q = Query::new("t");
    q.set_limit(2);
    q.set_after(2);

    let rows = run_query(&storage, &q).await;
    assert_eq!(rows, vec![status_row(3, 403), status_row(4, 500)]);
}

#[tokio::test]
async fn test_query_before_cursor() {
    let storage = status_fixture().await;
    let mut q = Query::new("t");
    q.set_limit(2);
    q.set_before(4);

    let rows = run_query(&storage, &q).await;
    assert_eq!(rows, vec![status_row(2, 404), status_row(3, 403)]);
}

#[tokio::test]
async fn test_query_integer_filters() {
    let storage = status_fixture().await;

    let cases: &[(&str, &str, Vec<serde_json::Value>)] = &[
        ("eq", "403", vec![status_row(3, 403)]),
        (
            "ne",
            "403",
            vec![
                status_row(1, 200),
                status_row(2, 404),
                status_row(4, 500),
                status_row(5, 400),
            ],
        ),
        ("lt", "403", vec![status_row(1, 200), status_row(5, 400)]),
        (
            "lte",
            "403",
            vec![status_row(1, 200), status_row(3, 403), status_row(5, 400)],
        ),
        ("gt", "403", vec![status_row(2, 404), status_row(4, 500)]),
        (
            "gte",
            "403",
            vec![status_row(2, 404), status_row(3, 403), status_row(4, 500)],
        ),
    ];

    for (op, value, want) in cases {
        let mut q = Query::new("t");
        q.set_filter("status", op, value).unwrap();
        let rows = run_query(&storage, &q).await;
        assert_eq!(&rows, want, "op {op}");
    }
}

// =========================================================================
// Query: strings
// =========================================================================

#[tokio::test]
async fn test_query_string_filters() {
    let storage = open_memory().await;
    let fields = schema(&[("message", FieldType::String)]);
    storage.migrate("t", &fields).await.unwrap();

    let messages = [
        "apple pie",
        "pineapple juice",
        "grapefruit",
        "apple",
        "green apple",
    ];
    write_and_wait(
        &storage,
        "t",
        messages
            .iter()
            .map(|m| record(&[("message", Value::Str(m.to_string()))]))
            .collect(),
    )
    .await;

    let msg_row = |id: i64, m: &str| row(&[("_cursor", cursor(id)), ("message", m.into())]);

    let cases: &[(&str, Vec<serde_json::Value>)] = &[
        ("exact", vec![msg_row(4, "apple")]),
        (
            "like",
            vec![
                msg_row(1, "apple pie"),
                msg_row(2, "pineapple juice"),
                msg_row(4, "apple"),
                msg_row(5, "green apple"),
            ],
        ),
        ("prefix", vec![msg_row(1, "apple pie"), msg_row(4, "apple")]),
        ("suffix", vec![msg_row(4, "apple"), msg_row(5, "green apple")]),
    ];

    for (op, want) in cases {
        let mut q = Query::new("t");
        q.set_filter("message", op, "apple").unwrap();
        let rows = run_query(&storage, &q).await;
        assert_eq!(&rows, want, "op {op}");
    }
}

// =========================================================================
// Query: time filters and cursor interactions
// =========================================================================

async fn time_fixture() -> SqliteStorage {
    let storage = open_memory().await;
    let fields = schema(&[("time", FieldType::Time)]);
    storage.migrate("t", &fields).await.unwrap();

    // 2025-01-02 at 10:00, 11:30, 13:15, 14:45, 16:00 UTC.
    let times = [
        1735812000000i64,
        1735817400000,
        1735823700000,
        1735829100000,
        1735833600000,
    ];
    write_and_wait(
        &storage,
        "t",
        times
            .iter()
            .map(|t| record(&[("time", Value::Int(*t))]))
            .collect(),
    )
    .await;
    storage
}

fn time_row(cursor_id: i64, time: i64) -> serde_json::Value {
    row(&[("_cursor", cursor(cursor_id)), ("time", time.into())])
}

#[tokio::test]
async fn test_query_since() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "since", "2025-01-02 13:00:00").unwrap();

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![
            time_row(3, 1735823700000),
            time_row(4, 1735829100000),
            time_row(5, 1735833600000),
        ]
    );
}

#[tokio::test]
async fn test_query_until() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "until", "2025-01-02 13:00:00").unwrap();

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(1, 1735812000000), time_row(2, 1735817400000)]
    );
}

#[tokio::test]
async fn test_query_since_with_limit_is_ascending() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "since", "2025-01-02 13:00:00").unwrap();
    q.set_limit(2);

    // Ascending scan: the earliest matches win the limit.
    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(3, 1735823700000), time_row(4, 1735829100000)]
    );
}

#[tokio::test]
async fn test_query_until_with_limit_is_descending() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "until", "2025-01-02 14:00:00").unwrap();
    q.set_limit(2);

    // Descending scan: the latest matches win, re-sorted ascending.
    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(2, 1735817400000), time_row(3, 1735823700000)]
    );
}

#[tokio::test]
async fn test_query_since_with_after_returns_nothing() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "since", "2025-01-02 13:00:00").unwrap();
    q.set_after(2);

    assert!(run_query(&storage, &q).await.is_empty());
}

#[tokio::test]
async fn test_query_until_with_before_returns_nothing() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "until", "2025-01-02 14:00:00").unwrap();
    q.set_before(2);

    assert!(run_query(&storage, &q).await.is_empty());
}

#[tokio::test]
async fn test_query_since_with_before() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "since", "2025-01-02 13:00:00").unwrap();
    q.set_before(5);

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(3, 1735823700000), time_row(4, 1735829100000)]
    );
}

#[tokio::test]
async fn test_query_until_with_after() {
    let storage = time_fixture().await;
    let mut q = Query::new("t");
    q.set_filter("time", "until", "2025-01-02 14:00:00").unwrap();
    q.set_after(1);

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(2, 1735817400000), time_row(3, 1735823700000)]
    );
}

#[tokio::test]
async fn test_query_since_relative() {
    let storage = time_fixture().await;
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 13, 0, 0).unwrap();

    let mut q = Query::new("t");
    q.set_filter_at("time", "since", "1h", now).unwrap();

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![
            time_row(3, 1735823700000),
            time_row(4, 1735829100000),
            time_row(5, 1735833600000),
        ]
    );
}

#[tokio::test]
async fn test_query_until_relative() {
    let storage = time_fixture().await;
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 13, 0, 0).unwrap();

    let mut q = Query::new("t");
    q.set_filter_at("time", "until", "1h", now).unwrap();

    let rows = run_query(&storage, &q).await;
    assert_eq!(
        rows,
        vec![time_row(1, 1735812000000), time_row(2, 1735817400000)]
    );
}

// =========================================================================
// NDJSON shape, cleanup, errors
// =========================================================================

#[tokio::test]
async fn test_ndjson_wire_shape() {
    let storage = open_memory().await;
    let fields = schema(&[("status", FieldType::Int)]);
    storage.migrate("t", &fields).await.unwrap();
    write_and_wait(&storage, "t", vec![record(&[("status", Value::Int(200))])]).await;

    let (tx, mut rx) = mpsc::channel::<Bytes>(16);
    storage.query(tx, &Query::new("t")).await.unwrap();

    let bytes = rx.try_recv().unwrap();
    assert_eq!(
        String::from_utf8(bytes.to_vec()).unwrap(),
        "{\"_cursor\":\"0000000000000001\",\"status\":200}\n"
    );
}

#[tokio::test]
async fn test_cleanup_deletes_old_rows() {
    let storage = open_memory().await;
    let fields = schema(&[("time", FieldType::Time)]);
    storage.migrate("t", &fields).await.unwrap();

    let now = Utc::now().timestamp_millis();
    let old = now - 7_200_000; // 2h ago
    let fresh = now - 60_000; // 1m ago
    write_and_wait(
        &storage,
        "t",
        vec![
            record(&[("time", Value::Int(old))]),
            record(&[("time", Value::Int(fresh))]),
        ],
    )
    .await;

    storage
        .cleanup("t", "time", Duration::from_secs(3600))
        .await
        .unwrap();

    let rows = run_query(&storage, &Query::new("t")).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["time"], serde_json::Value::from(fresh));
}

#[tokio::test]
async fn test_cleanup_missing_table_is_error() {
    let storage = open_memory().await;
    assert!(
        storage
            .cleanup("nope", "time", Duration::from_secs(3600))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_query_missing_table_is_error() {
    let storage = open_memory().await;
    let (tx, _rx) = mpsc::channel::<Bytes>(16);
    assert!(storage.query(tx, &Query::new("nope")).await.is_err());
}
