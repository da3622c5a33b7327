//! Rotation policy
//!
//! Size-triggered in-place rotation of a tailed log file. `truncate` resets
//! the file to zero length keeping the inode; `rename` moves it aside to
//! `<path>.remove`, recreates an empty file with the same mode and
//! ownership, and deletes the temp file in the background. An optional
//! shell command runs asynchronously after a successful rotation.

use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::InputError;

/// Suffix of the temp file a rename rotation leaves behind briefly.
const REMOVE_SUFFIX: &str = ".remove";

static RE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)([km]b)?$").expect("size grammar"));

/// Rotation section of a file input's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RotationConfig {
    /// Rotation method: "truncate" or "rename".
    #[serde(default)]
    pub method: Option<String>,

    /// Size threshold: `N`, `NKB`, or `NMB`, case-insensitive.
    #[serde(default)]
    pub max_size: Option<String>,

    /// Shell command to run after a successful rotation. Required for the
    /// rename method (something must consume the renamed data).
    #[serde(default)]
    pub run: Option<String>,
}

impl RotationConfig {
    pub fn compile(&self) -> Result<Rotation, InputError> {
        let raw_size = self.max_size.as_deref().unwrap_or_default();
        let max_size = parse_size(raw_size)?;

        let method = match self.method.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("") => return Err(InputError::MissingRotationMethod),
            Some("truncate") => Method::Truncate,
            Some("rename") => {
                if self.run.is_none() {
                    return Err(InputError::RenameRequiresRun);
                }
                Method::Rename
            }
            Some(other) => return Err(InputError::UnknownRotationMethod(other.to_string())),
        };

        Ok(Rotation {
            method,
            max_size,
            run: self.run.clone(),
        })
    }
}

fn parse_size(input: &str) -> Result<u64, InputError> {
    let caps = RE_SIZE
        .captures(input)
        .ok_or_else(|| InputError::RotationSize(input.to_string()))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| InputError::RotationSize(input.to_string()))?;

    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit == "kb" => 1024.0,
        Some(unit) if unit == "mb" => 1024.0 * 1024.0,
        _ => 1.0,
    };

    Ok((value * multiplier) as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Truncate,
    Rename,
}

/// Compiled rotation policy.
#[derive(Debug)]
pub struct Rotation {
    method: Method,
    max_size: u64,
    run: Option<String>,
}

impl Rotation {
    /// Whether a file of `size` bytes is due for rotation.
    pub fn check_size(&self, size: u64) -> bool {
        self.max_size > 0 && size >= self.max_size
    }

    /// Rotate the file, then kick off the configured command.
    pub fn rotate(&self, path: &str) -> io::Result<()> {
        match self.method {
            Method::Truncate => truncate(path)?,
            Method::Rename => rename(path)?,
        }

        if let Some(run) = &self.run {
            let run = run.clone();
            let path = path.to_string();
            tokio::spawn(run_command(run, path));
        }

        Ok(())
    }
}

fn truncate(path: &str) -> io::Result<()> {
    std::fs::File::options().write(true).open(path)?.set_len(0)
}

fn rename(path: &str) -> io::Result<()> {
    let tmp = format!("{path}{REMOVE_SUFFIX}");

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    std::fs::rename(path, &tmp)?;

    // Recreate with the original mode, then restore ownership.
    let file = std::fs::File::options()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(meta.mode()))?;

    let c_path = std::ffi::CString::new(path.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let ret = unsafe { libc::chown(c_path.as_ptr(), meta.uid(), meta.gid()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    tokio::spawn(async move {
        let _ = tokio::fs::remove_file(&tmp).await;
    });

    Ok(())
}

/// Run the post-rotation command through the shell, logging stderr line by
/// line if it fails.
async fn run_command(run: String, path: String) {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&run)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            tracing::error!(path = %path, status = %output.status, "rotation command failed");
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                tracing::error!(path = %path, "{line}");
            }
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "failed to start rotation command");
        }
    }
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod rotation_test;
