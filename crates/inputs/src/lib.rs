//! Lodge - Inputs
//!
//! Everything that produces records for an agent:
//!
//! - [`file`] - directory-watched log tailing: pattern-matched discovery,
//!   per-file incremental readers with durable offsets, line parsing, and
//!   size-triggered rotation.
//! - [`system`] - the periodic host telemetry sampler (CPU, memory, disk
//!   I/O, network counters).
//!
//! Both feed the same seam: a [`Processor`] that turns raw string maps into
//! typed records and writes them to storage. Inputs never talk to storage
//! directly.

pub mod error;
pub mod file;
pub mod system;

use std::collections::HashMap;

use async_trait::async_trait;

use lodge_schema::Record;

pub use error::InputError;
pub use file::offsets::{FileRegistryConfig, OffsetRegistry};
pub use file::watcher::{FileWatcher, FileWatcherConfig};
pub use system::{SystemConfig, SystemSampler};

/// The record pipeline seam between inputs and their agent.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Serialize a raw string map into a typed record and write it.
    async fn process(&self, data: HashMap<String, String>);

    /// Write an already-typed record.
    async fn write(&self, record: Record);
}
