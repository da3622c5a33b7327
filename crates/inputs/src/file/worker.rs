//! Per-file worker
//!
//! Owns one tailed file. Directory events land in `handle()`, which feeds a
//! 250 ms debouncer; each fire runs one tail pass: seek to the remembered
//! offset, consume complete lines, parse and forward them, persist the new
//! offset, then check the rotation policy.
//!
//! Error policy: failures opening, statting, or seeking abort the pass
//! silently (the next event retries); a mid-read error stops the loop with
//! the offset persisted as far as it advanced; a line that fails to parse
//! is skipped.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use crate::Processor;
use crate::file::offsets::OffsetRegistry;
use crate::file::parser::LineParser;
use crate::file::rotation::Rotation;

use lodge_timing::Debouncer;

/// Quiet interval between a change event and the tail pass.
const TAIL_DELAY: Duration = Duration::from_millis(250);

/// Read buffer size for a tail pass.
const READ_BUFFER: usize = 64 * 1024;

/// Everything a tail pass needs, shared with the debounce task.
pub(crate) struct TailContext {
    pub path: String,
    pub extras: HashMap<String, String>,
    pub parser: Arc<dyn LineParser>,
    pub rotation: Option<Arc<Rotation>>,
    pub processor: Arc<dyn Processor>,
    pub offsets: OffsetRegistry,
}

pub(crate) struct FileWorker {
    debounce: Debouncer,
}

impl FileWorker {
    pub fn start(ctx: Arc<TailContext>) -> Self {
        let debounce = Debouncer::spawn(TAIL_DELAY, false, move || {
            let ctx = Arc::clone(&ctx);
            async move { ctx.tail().await }
        });

        Self { debounce }
    }

    /// A change event for this file arrived.
    pub fn handle(&self) {
        self.debounce.emit();
    }

    pub fn stop(&self) {
        self.debounce.stop();
    }
}

impl TailContext {
    pub async fn tail(&self) {
        let Ok(mut file) = std::fs::File::open(&self.path) else {
            return;
        };
        let Ok(meta) = file.metadata() else {
            return;
        };
        let size = meta.len();

        let mut offset = self.offsets.get(&self.path);
        if offset > size {
            tracing::debug!(path = %self.path, "file truncated, resetting offset");
            offset = 0;
        }

        if file.seek(SeekFrom::Start(offset)).is_err() {
            return;
        }

        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        let mut line: Vec<u8> = Vec::new();

        loop {
            line.clear();
            let n = match reader.read_until(b'\n', &mut line) {
                Ok(0) => break, // EOF
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(path = %self.path, error = %e, "read error during tail");
                    break;
                }
            };

            if line.last() != Some(&b'\n') {
                // Partial line; leave it for a future pass.
                break;
            }
            offset += n as u64;

            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            match self.parser.parse(&text) {
                Ok(Some(mut data)) => {
                    // Filename captures win over parsed fields.
                    data.extend(
                        self.extras
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                    self.processor.process(data).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(path = %self.path, error = %e, "skipping unparsable line");
                }
            }
        }

        self.offsets.set(&self.path, offset);

        if let Some(rotation) = &self.rotation {
            if rotation.check_size(size) {
                match rotation.rotate(&self.path) {
                    Ok(()) => {
                        self.offsets.set(&self.path, 0);
                        tracing::info!(path = %self.path, size, "rotated log file");
                    }
                    Err(e) => {
                        tracing::warn!(path = %self.path, error = %e, "rotation failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
