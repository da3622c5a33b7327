//! Lodge - Storage engine
//!
//! Tabular, cursor-ordered persistence for agent records plus the typed
//! query model over it.
//!
//! # Architecture
//!
//! ```text
//! [Agents] ──write──▶ bounded queue ──▶ [insert task] ──▶ table <name>
//!                                                         (_cursor PK)
//! [HTTP]  ──query──▶ Query{filters} ──▶ scan + re-sort ──▶ NDJSON lines
//! ```
//!
//! Each agent owns one table named after it. `_cursor` is a monotonically
//! increasing integer primary key assigned at insert; queries always emit
//! rows in ascending cursor order regardless of how the scan ran. Columns
//! starting with `_` are engine-internal and invisible to schema migration.
//!
//! Two drivers implement the [`StorageDriver`] capability: the embedded
//! Turso (SQLite-compatible) engine and an echo driver that prints records
//! and answers queries with nothing.

pub mod echo;
pub mod error;
pub mod query;
pub mod retention;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;

use lodge_schema::{CompiledField, Record};

pub use echo::EchoStorage;
pub use error::{QueryError, StorageError};
pub use query::{Filter, FilterOp, Query};
pub use retention::{Retention, RetentionConfig};
pub use sqlite::{SqliteConfig, SqliteStorage};

/// Storage capability.
///
/// `migrate` runs synchronously on the caller's task and completes before
/// any insert for that table; `write` is asynchronous and best-effort.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Reconcile the table for `name` with the desired schema, creating it
    /// if missing and adding/dropping/retyping columns otherwise.
    async fn migrate(&self, name: &str, fields: &[CompiledField]) -> Result<(), StorageError>;

    /// Delete rows whose `field` value is older than `now - period`.
    async fn cleanup(&self, name: &str, field: &str, period: Duration) -> Result<(), StorageError>;

    /// Enqueue a record for insertion. Blocks while the insert queue is
    /// full; failures past that point are logged and the record dropped.
    async fn write(&self, name: &str, record: Record);

    /// Stream matching rows as NDJSON lines into `out`, ascending by
    /// `_cursor`. A dropped receiver ends the stream without error.
    async fn query(&self, out: mpsc::Sender<Bytes>, query: &Query) -> Result<(), StorageError>;

    /// Stop background work and release the engine.
    async fn close(&self);
}

/// Storage section of the configuration. Without an `sqlite` block the echo
/// driver is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

impl StorageConfig {
    /// Open the configured driver.
    pub async fn open(&self) -> Result<Arc<dyn StorageDriver>, StorageError> {
        match &self.sqlite {
            Some(config) => Ok(Arc::new(SqliteStorage::open(config.clone()).await?)),
            None => Ok(Arc::new(EchoStorage)),
        }
    }
}
