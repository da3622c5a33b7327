//! File-based log input
//!
//! A watcher per configured path pattern discovers files in one directory,
//! spawns a worker per matched file, and reacts to directory events. Workers
//! tail their file incrementally, remembering byte offsets in the shared
//! offset registry so restarts pick up where the last run stopped.

pub mod offsets;
pub mod parser;
pub mod rotation;
pub mod watcher;
pub mod worker;

pub use offsets::{FileRegistryConfig, OffsetRegistry};
pub use parser::{JsonParser, LineParser, ParseError, PlainParser};
pub use rotation::{Rotation, RotationConfig};
pub use watcher::{FileWatcher, FileWatcherConfig};
