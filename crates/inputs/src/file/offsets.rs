//! Offset registry
//!
//! Durable map from file path to the byte position past the last fully
//! consumed line. Loaded from a YAML file at startup, updated by workers,
//! flushed through a 1-second debounce and once more on close.
//!
//! For a file the registry has never seen, `get` computes a tail-N starting
//! offset: only the last `limit` lines of pre-existing content surface on
//! the first pass.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;

use lodge_timing::Debouncer;

use crate::error::InputError;

/// Quiet interval before a flush.
const FLUSH_DELAY: Duration = Duration::from_secs(1);

/// Page size for the backward tail-N scan.
const TAIL_PAGE: u64 = 4096;

const DEFAULT_LIMIT: usize = 100;

/// The `file` section of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRegistryConfig {
    /// Path to the offsets YAML file. Unset disables persistence.
    #[serde(default)]
    pub offsets: Option<String>,

    /// Number of trailing lines surfaced from a first-seen file. 0 reads
    /// whole files from the start.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for FileRegistryConfig {
    fn default() -> Self {
        Self {
            offsets: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

struct RegistryInner {
    path: Option<PathBuf>,
    limit: usize,
    offsets: Mutex<HashMap<String, u64>>,
}

impl RegistryInner {
    fn save(&self) {
        let Some(path) = &self.path else { return };

        let data = {
            let offsets = self.offsets.lock();
            match serde_yaml::to_string(&*offsets) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode offsets");
                    return;
                }
            }
        };

        if let Err(e) = std::fs::write(path, data) {
            tracing::error!(path = %path.display(), error = %e, "failed to write offsets");
        }
    }
}

/// Shared handle to the offset registry. Cheap to clone; one per process,
/// passed explicitly to watchers and workers.
#[derive(Clone)]
pub struct OffsetRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Arc<RegistryInner>,
    flush: Debouncer,
}

impl OffsetRegistry {
    /// Load persisted offsets (a missing file is an empty map) and start the
    /// flush debouncer.
    pub fn open(config: &FileRegistryConfig) -> Result<Self, InputError> {
        let path = config.offsets.as_ref().map(PathBuf::from);

        let mut offsets = HashMap::new();
        if let Some(path) = &path {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|source| InputError::OffsetsIo {
                    path: path.display().to_string(),
                    source,
                })?;
            }

            match std::fs::read_to_string(path) {
                Ok(data) => {
                    offsets =
                        serde_yaml::from_str(&data).map_err(|source| InputError::OffsetsParse {
                            path: path.display().to_string(),
                            source,
                        })?;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(InputError::OffsetsIo {
                        path: path.display().to_string(),
                        source,
                    });
                }
            }
        }

        let inner = Arc::new(RegistryInner {
            path,
            limit: config.limit,
            offsets: Mutex::new(offsets),
        });

        let flush_target = Arc::clone(&inner);
        let flush = Debouncer::spawn(FLUSH_DELAY, false, move || {
            let inner = Arc::clone(&flush_target);
            async move { inner.save() }
        });

        Ok(Self {
            shared: Arc::new(Shared { inner, flush }),
        })
    }

    /// The offset to resume `path` from. Unknown files start at the tail-N
    /// offset (or 0 when the limit is disabled).
    pub fn get(&self, path: &str) -> u64 {
        if let Some(offset) = self.shared.inner.offsets.lock().get(path) {
            return *offset;
        }

        if self.shared.inner.limit == 0 {
            return 0;
        }

        tail_offset(Path::new(path), self.shared.inner.limit)
    }

    /// Record the new offset and arm a debounced flush.
    pub fn set(&self, path: &str, offset: u64) {
        self.shared.inner.offsets.lock().insert(path.to_string(), offset);
        self.shared.flush.emit();
    }

    /// Stop the debouncer and flush one final time.
    pub fn close(&self) {
        self.shared.flush.stop();
        self.shared.inner.save();
    }
}

/// Position one past the Nth-from-last newline, scanning backward from EOF
/// in fixed pages. Files with fewer than N lines start at 0.
fn tail_offset(path: &Path, lines: usize) -> u64 {
    let Ok(file) = File::open(path) else { return 0 };
    let Ok(meta) = file.metadata() else { return 0 };

    let size = meta.len();
    if size == 0 {
        return 0;
    }

    let mut buffer = [0u8; TAIL_PAGE as usize];
    let mut newline_count = 0usize;
    let mut offset = size - 1;

    // The trailing newline of a complete last line counts.
    if file.read_at(&mut buffer[..1], offset).is_ok_and(|n| n == 1) && buffer[0] == b'\n' {
        newline_count = 1;
    }

    while offset > 0 && newline_count <= lines {
        let read_size = TAIL_PAGE.min(offset) as usize;
        let start = offset - read_size as u64;

        if file.read_exact_at(&mut buffer[..read_size], start).is_err() {
            return 0;
        }
        offset = start;

        for i in (0..read_size).rev() {
            if buffer[i] == b'\n' {
                newline_count += 1;
                if newline_count > lines {
                    return offset + i as u64 + 1;
                }
            }
        }
    }

    0
}

#[cfg(test)]
#[path = "offsets_test.rs"]
mod offsets_test;
