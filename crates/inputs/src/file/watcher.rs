//! File watcher
//!
//! Watches one directory for files whose basename matches a regex with
//! named captures, e.g. `/var/log/nginx/access_(?P<host>.*)\.log`. The
//! directory part of the path is literal; only the basename is a pattern,
//! and it is implicitly anchored. Captures become "extras" merged into
//! every record a matched file produces.
//!
//! One inotify-backed watch on the directory drives everything: writes are
//! routed to the file's worker, created files start workers, removed or
//! renamed-away files stop them. Individual files are never watched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Processor;
use crate::error::InputError;
use crate::file::offsets::OffsetRegistry;
use crate::file::parser::{JsonParser, LineParser, PlainParser};
use crate::file::rotation::{Rotation, RotationConfig};
use crate::file::worker::{FileWorker, TailContext};

/// File section of an agent's configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FileWatcherConfig {
    /// Absolute path whose basename may be a regex with named captures.
    pub path: String,

    /// Line format: "plain" (default) or "json".
    #[serde(default)]
    pub format: Option<String>,

    /// Line regex for the plain format.
    #[serde(default)]
    pub regex: Option<String>,

    /// Optional size-triggered rotation of tailed files.
    #[serde(default)]
    pub rotation: Option<RotationConfig>,
}

struct WatcherShared {
    dir: PathBuf,
    pattern: Regex,
    parser: Arc<dyn LineParser>,
    rotation: Option<Arc<Rotation>>,
    processor: Arc<dyn Processor>,
    offsets: OffsetRegistry,
}

/// Directory watcher owning the per-file workers for one path pattern.
pub struct FileWatcher {
    shared: Arc<WatcherShared>,
    token: CancellationToken,
}

impl FileWatcher {
    /// Validate the configuration and compile the parsers. Watching starts
    /// with [`start`](Self::start).
    pub fn init(
        config: &FileWatcherConfig,
        processor: Arc<dyn Processor>,
        offsets: OffsetRegistry,
    ) -> Result<Self, InputError> {
        if config.path.is_empty() {
            return Err(InputError::MissingPath);
        }
        if !config.path.starts_with('/') {
            return Err(InputError::RelativePath(config.path.clone()));
        }

        let (dir, basename) = config
            .path
            .rsplit_once('/')
            .ok_or(InputError::MissingPath)?;

        let pattern =
            Regex::new(&format!("^{basename}$")).map_err(InputError::Pattern)?;

        let parser: Arc<dyn LineParser> = match config.format.as_deref().unwrap_or("plain") {
            "plain" => {
                let regex = config.regex.as_deref().ok_or(InputError::MissingRegex)?;
                Arc::new(PlainParser::new(regex)?)
            }
            "json" => Arc::new(JsonParser),
            other => return Err(InputError::UnknownFormat(other.to_string())),
        };

        let rotation = match &config.rotation {
            Some(rotation) => Some(Arc::new(rotation.compile()?)),
            None => None,
        };

        Ok(Self {
            shared: Arc::new(WatcherShared {
                dir: PathBuf::from(dir),
                pattern,
                parser,
                rotation,
                processor,
                offsets,
            }),
            token: CancellationToken::new(),
        })
    }

    /// Spawn the directory event loop.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();
        tokio::spawn(run_watch(shared, token));
    }

    /// Stop the event loop and all workers.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Extract the extras map if `name` matches the basename pattern.
    fn match_extras(pattern: &Regex, name: &str) -> Option<HashMap<String, String>> {
        let caps = pattern.captures(name)?;

        let mut extras = HashMap::new();
        for group in pattern.capture_names().flatten() {
            if let Some(m) = caps.name(group) {
                extras.insert(group.to_string(), m.as_str().to_string());
            }
        }
        Some(extras)
    }
}

async fn run_watch(shared: Arc<WatcherShared>, token: CancellationToken) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut fs_watcher = match notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::error!(dir = %shared.dir.display(), error = %e, "failed to create watcher");
            return;
        }
    };

    if let Err(e) = fs_watcher.watch(&shared.dir, RecursiveMode::NonRecursive) {
        tracing::error!(dir = %shared.dir.display(), error = %e, "failed to watch directory");
        return;
    }

    let mut workers: HashMap<String, FileWorker> = HashMap::new();

    // Pick up files already present.
    match std::fs::read_dir(&shared.dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                if entry.file_type().is_ok_and(|t| t.is_file()) {
                    start_worker(&shared, &mut workers, &entry.path());
                }
            }
        }
        Err(e) => {
            tracing::error!(dir = %shared.dir.display(), error = %e, "failed to read directory");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            event = rx.recv() => {
                let Some(event) = event else { break };
                let Ok(event) = event else { continue };

                match event.kind {
                    EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                        for path in &event.paths {
                            handle_write(&mut workers, path);
                        }
                    }
                    EventKind::Create(CreateKind::File | CreateKind::Any)
                    | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                        for path in &event.paths {
                            start_worker(&shared, &mut workers, path);
                        }
                    }
                    EventKind::Remove(_)
                    | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                        for path in &event.paths {
                            stop_worker(&mut workers, path);
                        }
                    }
                    EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                        if let [from, to] = event.paths.as_slice() {
                            stop_worker(&mut workers, from);
                            start_worker(&shared, &mut workers, to);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    for worker in workers.values() {
        worker.stop();
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn start_worker(
    shared: &Arc<WatcherShared>,
    workers: &mut HashMap<String, FileWorker>,
    path: &Path,
) {
    let Some(name) = basename(path) else { return };
    if workers.contains_key(&name) {
        return;
    }

    let Some(extras) = FileWatcher::match_extras(&shared.pattern, &name) else {
        return;
    };

    if !std::fs::metadata(path).is_ok_and(|m| m.is_file()) {
        return;
    }

    tracing::debug!(path = %path.display(), "tracking log file");

    let ctx = Arc::new(TailContext {
        path: path.to_string_lossy().into_owned(),
        extras,
        parser: Arc::clone(&shared.parser),
        rotation: shared.rotation.clone(),
        processor: Arc::clone(&shared.processor),
        offsets: shared.offsets.clone(),
    });

    workers.insert(name, FileWorker::start(ctx));
}

fn handle_write(workers: &mut HashMap<String, FileWorker>, path: &Path) {
    let Some(name) = basename(path) else { return };
    if let Some(worker) = workers.get(&name) {
        worker.handle();
    }
}

fn stop_worker(workers: &mut HashMap<String, FileWorker>, path: &Path) {
    let Some(name) = basename(path) else { return };
    if let Some(worker) = workers.remove(&name) {
        tracing::debug!(path = %path.display(), "untracking log file");
        worker.stop();
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
