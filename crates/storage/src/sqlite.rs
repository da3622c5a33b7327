//! Turso (SQLite-compatible) storage driver
//!
//! One table per agent with a `_cursor INTEGER PRIMARY KEY AUTOINCREMENT`
//! column followed by one column per schema field. Inserts flow through a
//! bounded queue with a single consumer task; producers await queue capacity
//! (at-least-once, best-effort: a failed insert is logged and the record
//! dropped).
//!
//! Queries run as a two-step scan: an inner SELECT ordered by `_cursor` in
//! the direction pagination wants (ascending from an `after` cursor or a
//! `since` bound, otherwise descending), with the LIMIT applied there, then
//! an outer re-sort ascending so callers always see monotonically increasing
//! cursors.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turso::{Builder, Connection, Database};

use lodge_schema::{CompiledField, FieldType, Record, Value};

use crate::StorageDriver;
use crate::error::StorageError;
use crate::query::{FilterOp, Query};

/// Insert queue capacity; producers block once it fills.
const INSERT_QUEUE_CAPACITY: usize = 256;

const DEFAULT_JOURNAL_MODE: &str = "wal";
const DEFAULT_SYNCHRONOUS: &str = "normal";
const DEFAULT_CACHE_SIZE: i64 = 10000;

/// Configuration for the embedded store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqliteConfig {
    /// Database file path. `:memory:` keeps everything in memory.
    #[serde(default)]
    pub path: String,

    /// Journal mode pragma. Default: "wal".
    #[serde(default)]
    pub journal_mode: Option<String>,

    /// Synchronous pragma. Default: "normal".
    #[serde(default)]
    pub synchronous: Option<String>,

    /// Cache size pragma, in pages. Default: 10000.
    #[serde(default)]
    pub cache_size: Option<i64>,
}

impl SqliteConfig {
    /// In-memory configuration, used by tests.
    pub fn memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            ..Self::default()
        }
    }
}

struct InsertItem {
    table: String,
    record: Record,
}

/// The embedded storage driver.
pub struct SqliteStorage {
    db: Database,
    queue: mpsc::Sender<InsertItem>,
    token: CancellationToken,
}

impl SqliteStorage {
    /// Open the database, apply pragmas, and start the insert consumer.
    pub async fn open(config: SqliteConfig) -> Result<Self, StorageError> {
        if !config.path.starts_with(':') {
            if let Some(dir) = Path::new(&config.path).parent() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| StorageError::io(&config.path, e))?;
            }
        }

        let db = Builder::new_local(&config.path).build().await?;

        let conn = db.connect()?;
        let journal_mode = config.journal_mode.as_deref().unwrap_or(DEFAULT_JOURNAL_MODE);
        let synchronous = config.synchronous.as_deref().unwrap_or(DEFAULT_SYNCHRONOUS);
        let cache_size = config.cache_size.unwrap_or(DEFAULT_CACHE_SIZE);
        for pragma in [
            format!("PRAGMA journal_mode = {journal_mode}"),
            format!("PRAGMA synchronous = {synchronous}"),
            format!("PRAGMA cache_size = {cache_size}"),
        ] {
            // Pragmas may return a result row; step once to apply them.
            let mut rows = conn.query(&pragma, ()).await?;
            let _ = rows.next().await;
        }

        let (queue, rx) = mpsc::channel(INSERT_QUEUE_CAPACITY);
        let token = CancellationToken::new();
        tokio::spawn(run_insert_consumer(db.clone(), rx, token.clone()));

        Ok(Self { db, queue, token })
    }

    fn sql_type(kind: FieldType) -> &'static str {
        match kind {
            FieldType::String => "TEXT",
            FieldType::Int | FieldType::Time => "INTEGER",
            FieldType::Float => "REAL",
        }
    }

    async fn table_exists(conn: &Connection, name: &str) -> Result<bool, StorageError> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
                vec![turso::Value::Text(name.to_string())],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(matches!(row.get_value(0)?, turso::Value::Integer(v) if v != 0)),
            None => Ok(false),
        }
    }

    /// All columns of a table as `(name, type)` in creation order; empty if
    /// the table does not exist.
    async fn table_columns(
        conn: &Connection,
        name: &str,
    ) -> Result<Vec<(String, String)>, StorageError> {
        let mut rows = conn
            .query(&format!("PRAGMA table_info(`{name}`)"), ())
            .await?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next().await? {
            let col_name = row.get_value(1)?;
            let col_type = row.get_value(2)?;
            if let (Some(n), Some(t)) = (col_name.as_text(), col_type.as_text()) {
                columns.push((n.clone(), t.clone()));
            }
        }

        Ok(columns)
    }

    async fn create_table(
        conn: &Connection,
        name: &str,
        fields: &[CompiledField],
    ) -> Result<(), StorageError> {
        let mut columns = vec!["`_cursor` INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in fields {
            columns.push(format!("`{}` {}", field.name(), Self::sql_type(field.kind())));
        }

        let sql = format!("CREATE TABLE `{}` ({})", name, columns.join(", "));
        conn.execute(&sql, ()).await?;
        Ok(())
    }

    /// Reconcile an existing table: drop columns missing from the desired
    /// schema (a retyped column is dropped and re-added), then add the
    /// missing ones. Columns starting with `_` are engine-internal and left
    /// alone. Existing rows are not rewritten on retype.
    async fn migrate_table(
        conn: &Connection,
        name: &str,
        fields: &[CompiledField],
    ) -> Result<(), StorageError> {
        let mut current: HashMap<String, String> = Self::table_columns(conn, name)
            .await?
            .into_iter()
            .filter(|(col, _)| !col.starts_with('_'))
            .collect();

        let desired: HashMap<&str, &str> = fields
            .iter()
            .map(|f| (f.name(), Self::sql_type(f.kind())))
            .collect();

        let mut drop = Vec::new();
        for (col, col_type) in &current {
            match desired.get(col.as_str()) {
                Some(want) if *want == col_type.as_str() => {}
                _ => drop.push(col.clone()),
            }
        }
        for col in drop {
            current.remove(&col);
            conn.execute(&format!("ALTER TABLE `{name}` DROP COLUMN `{col}`"), ())
                .await
                .map_err(|e| StorageError::migrate(name, format!("drop column {col}: {e}")))?;
        }

        for field in fields {
            if !current.contains_key(field.name()) {
                let col_type = Self::sql_type(field.kind());
                conn.execute(
                    &format!(
                        "ALTER TABLE `{name}` ADD COLUMN `{}` {col_type}",
                        field.name()
                    ),
                    (),
                )
                .await
                .map_err(|e| {
                    StorageError::migrate(name, format!("add column {}: {e}", field.name()))
                })?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StorageDriver for SqliteStorage {
    async fn migrate(&self, name: &str, fields: &[CompiledField]) -> Result<(), StorageError> {
        let conn = self.db.connect()?;

        if !Self::table_exists(&conn, name).await? {
            Self::create_table(&conn, name, fields).await
        } else {
            Self::migrate_table(&conn, name, fields).await
        }
    }

    async fn cleanup(&self, name: &str, field: &str, period: Duration) -> Result<(), StorageError> {
        let conn = self.db.connect()?;
        let horizon = Utc::now().timestamp_millis() - period.as_millis() as i64;

        conn.execute(
            &format!("DELETE FROM `{name}` WHERE `{field}` < ?"),
            vec![turso::Value::Integer(horizon)],
        )
        .await?;

        Ok(())
    }

    async fn write(&self, name: &str, record: Record) {
        let item = InsertItem {
            table: name.to_string(),
            record,
        };

        // Blocks while the queue is full; fails only during shutdown.
        if self.queue.send(item).await.is_err() {
            tracing::debug!(table = name, "insert queue closed, record dropped");
        }
    }

    async fn query(&self, out: mpsc::Sender<Bytes>, query: &Query) -> Result<(), StorageError> {
        let conn = self.db.connect()?;

        let columns = Self::table_columns(&conn, query.name()).await?;
        if columns.is_empty() {
            return Err(StorageError::MissingTable(query.name().to_string()));
        }
        let names: Vec<String> = columns.into_iter().map(|(name, _)| name).collect();

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<turso::Value> = Vec::new();
        let mut reverse = true;

        if let Some(after) = query.after() {
            reverse = false;
            conditions.push("_cursor > ?".to_string());
            args.push(turso::Value::Integer(after));
        } else if let Some(before) = query.before() {
            conditions.push("_cursor < ?".to_string());
            args.push(turso::Value::Integer(before));
        }

        for filter in query.filters() {
            let name = &filter.name;
            match &filter.op {
                FilterOp::Eq(v) => {
                    conditions.push(format!("`{name}` = ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Ne(v) => {
                    conditions.push(format!("`{name}` != ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Lt(v) => {
                    conditions.push(format!("`{name}` < ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Lte(v) => {
                    conditions.push(format!("`{name}` <= ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Gt(v) => {
                    conditions.push(format!("`{name}` > ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Gte(v) => {
                    conditions.push(format!("`{name}` >= ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Exact(s) => {
                    conditions.push(format!("`{name}` = ?"));
                    args.push(turso::Value::Text(s.clone()));
                }
                FilterOp::Like(s) => {
                    conditions.push(format!("`{name}` LIKE ?"));
                    args.push(turso::Value::Text(format!("%{s}%")));
                }
                FilterOp::Prefix(s) => {
                    conditions.push(format!("`{name}` LIKE ?"));
                    args.push(turso::Value::Text(format!("{s}%")));
                }
                FilterOp::Suffix(s) => {
                    conditions.push(format!("`{name}` LIKE ?"));
                    args.push(turso::Value::Text(format!("%{s}")));
                }
                FilterOp::Since(v) => {
                    // Meaningful only with a before-cursor: records since an
                    // instant, paginating earlier cursors.
                    if query.after().is_some() {
                        return Ok(());
                    }
                    reverse = false;
                    conditions.push(format!("`{name}` > ?"));
                    args.push(turso::Value::Integer(*v));
                }
                FilterOp::Until(v) => {
                    // Symmetric: only meaningful with an after-cursor.
                    if query.before().is_some() {
                        return Ok(());
                    }
                    reverse = true;
                    conditions.push(format!("`{name}` < ?"));
                    args.push(turso::Value::Integer(*v));
                }
            }
        }

        let select_list: Vec<String> = names.iter().map(|n| format!("`{n}`")).collect();
        let mut sql = format!("SELECT {} FROM `{}`", select_list.join(", "), query.name());

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(if reverse {
            " ORDER BY _cursor DESC"
        } else {
            " ORDER BY _cursor ASC"
        });

        if let Some(limit) = query.limit() {
            sql.push_str(" LIMIT ?");
            args.push(turso::Value::Integer(limit));
        }

        // Re-sort the selected window so output is always ascending.
        let sql = format!("SELECT * FROM ( {sql} ) temp ORDER BY _cursor ASC");

        let mut rows = conn.query(&sql, args).await?;
        while let Some(row) = rows.next().await? {
            let mut values = Vec::with_capacity(names.len());
            for i in 0..names.len() {
                values.push(row.get_value(i)?);
            }

            let mut line = json_line(&names, &values);
            line.push('\n');

            if out.send(Bytes::from(line)).await.is_err() {
                // Receiver went away; the client is gone.
                return Ok(());
            }
        }

        Ok(())
    }

    async fn close(&self) {
        self.token.cancel();
    }
}

/// Single consumer of the insert queue; the only writer on the insert path.
async fn run_insert_consumer(
    db: Database,
    mut rx: mpsc::Receiver<InsertItem>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,

            item = rx.recv() => {
                let Some(item) = item else { return };
                if let Err(e) = insert(&db, &item.table, &item.record).await {
                    tracing::info!(
                        table = %item.table,
                        error = %e,
                        "failed to insert record, dropping"
                    );
                }
            }
        }
    }
}

async fn insert(db: &Database, table: &str, record: &Record) -> Result<(), StorageError> {
    let conn = db.connect()?;

    let mut columns = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());
    let mut values: Vec<turso::Value> = Vec::with_capacity(record.len());

    for (name, value) in record {
        columns.push(format!("`{name}`"));
        placeholders.push("?");
        values.push(match value {
            Value::Str(s) => turso::Value::Text(s.clone()),
            Value::Int(v) => turso::Value::Integer(*v),
            Value::Float(v) => turso::Value::Real(*v),
        });
    }

    let sql = format!(
        "INSERT INTO `{}` ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, values).await?;
    Ok(())
}

/// One NDJSON object: `_cursor` first as a 16-digit lowercase hex string
/// (part of the wire contract), remaining values in column order with their
/// natural JSON types; blobs are decoded as UTF-8 text.
fn json_line(columns: &[String], values: &[turso::Value]) -> String {
    let mut out = String::with_capacity(64);
    out.push('{');

    for (i, col) in columns.iter().enumerate() {
        if i == 0 {
            let cursor = match values[i] {
                turso::Value::Integer(v) => v,
                _ => 0,
            };
            out.push_str(&format!("\"{col}\":\"{cursor:016x}\""));
            continue;
        }

        out.push(',');
        out.push('"');
        out.push_str(col);
        out.push_str("\":");

        match &values[i] {
            turso::Value::Null => out.push_str("null"),
            turso::Value::Integer(v) => out.push_str(&v.to_string()),
            turso::Value::Real(v) => match serde_json::to_string(v) {
                Ok(s) => out.push_str(&s),
                Err(_) => out.push_str("null"),
            },
            turso::Value::Text(s) => match serde_json::to_string(s) {
                Ok(escaped) => out.push_str(&escaped),
                Err(_) => out.push_str("null"),
            },
            turso::Value::Blob(b) => {
                let text = String::from_utf8_lossy(b);
                match serde_json::to_string(&text) {
                    Ok(escaped) => out.push_str(&escaped),
                    Err(_) => out.push_str("null"),
                }
            }
        }
    }

    out.push('}');
    out
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod sqlite_test;
