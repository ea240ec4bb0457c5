//! Snapshot persistence for the volatile alert timeline.
//!
//! The snapshot is a pretty-printed JSON array of alerts, rewritten in full
//! on every accepted alert. Writes go to a `.tmp` sibling first and are then
//! renamed into place so a crash never leaves a half-written file behind.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::Alert;

/// Atomically write JSON data to a file.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// What was found on disk when loading a snapshot.
#[derive(Debug)]
pub enum SnapshotLoad {
    /// No snapshot file exists.
    Missing,
    /// The file exists but holds only whitespace.
    Empty,
    Loaded(Vec<Alert>),
    /// The file could not be read or parsed.
    Corrupt(io::Error),
}

impl SnapshotLoad {
    /// The recovered alerts; anything other than a clean load yields none.
    pub fn into_alerts(self) -> Vec<Alert> {
        match self {
            SnapshotLoad::Loaded(alerts) => alerts,
            _ => Vec::new(),
        }
    }
}

/// Handle on the on-disk snapshot of the volatile alert timeline.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> SnapshotLoad {
        if !self.path.exists() {
            return SnapshotLoad::Missing;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => return SnapshotLoad::Corrupt(e),
        };
        if content.trim().is_empty() {
            return SnapshotLoad::Empty;
        }
        match serde_json::from_str(&content) {
            Ok(alerts) => SnapshotLoad::Loaded(alerts),
            Err(e) => SnapshotLoad::Corrupt(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    /// Replace the snapshot with the full timeline.
    pub fn save(&self, alerts: &[Alert]) -> io::Result<()> {
        atomic_write_json(&self.path, alerts)
    }
}
