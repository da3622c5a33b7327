//! Echo storage driver
//!
//! Used when no embedded store is configured: accepts everything, persists
//! nothing, and prints each record to stdout so the pipeline can be watched
//! end to end.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use lodge_schema::{CompiledField, Record};

use crate::StorageDriver;
use crate::error::StorageError;
use crate::query::Query;

#[derive(Debug, Default)]
pub struct EchoStorage;

#[async_trait]
impl StorageDriver for EchoStorage {
    async fn migrate(&self, _name: &str, _fields: &[CompiledField]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn cleanup(
        &self,
        _name: &str,
        _field: &str,
        _period: Duration,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn write(&self, name: &str, record: Record) {
        match serde_json::to_string(&record) {
            Ok(line) => println!("{name} {line}"),
            Err(e) => tracing::debug!(table = name, error = %e, "unprintable record"),
        }
    }

    async fn query(&self, _out: mpsc::Sender<Bytes>, _query: &Query) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) {}
}
