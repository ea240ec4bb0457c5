//! Alert storage: a volatile timeline for live polling plus a durable
//! SQLite history that survives restarts.
//!
//! Every accepted alert is written to the `alerts` table first and only then
//! appended to the in-memory timeline, so "accepted" always implies
//! "durable". The timeline is additionally mirrored to a JSON snapshot file
//! which is reloaded on startup.

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{SnapshotFile, SnapshotLoad};
use crate::types::{Alert, parse_alert_time};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time TEXT NOT NULL,
        message TEXT NOT NULL,
        status TEXT NOT NULL
    );
";

/// Configuration for alert storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding the durable history.
    pub database_path: PathBuf,
    /// JSON snapshot of the volatile timeline. `None` disables snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    /// Default number of rows returned by history queries.
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("alerts_history.db"),
            snapshot_path: Some(PathBuf::from("alerts_log.json")),
            history_limit: 50,
        }
    }
}

impl StoreConfig {
    /// Resolve relative paths against `base`.
    pub fn rooted_at(&self, base: &Path) -> Self {
        Self {
            database_path: base.join(&self.database_path),
            snapshot_path: self.snapshot_path.as_ref().map(|p| base.join(p)),
            history_limit: self.history_limit,
        }
    }
}

/// Shared alert store. Safe to use from the pipeline and request handlers
/// at the same time.
pub struct AlertStore {
    conn: Mutex<Connection>,
    volatile: RwLock<Vec<Alert>>,
    snapshot: Option<SnapshotFile>,
}

impl std::fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStore")
            .field("volatile_len", &self.len())
            .field("snapshot", &self.snapshot.as_ref().map(|s| s.path()))
            .finish()
    }
}

impl AlertStore {
    /// Open the store, creating the schema if needed and restoring the
    /// volatile timeline from the snapshot.
    ///
    /// Idempotent: opening the same paths twice is harmless. A missing or
    /// unreadable database is an error; a malformed snapshot is not.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let path = &config.database_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        let snapshot = config.snapshot_path.as_ref().map(SnapshotFile::new);
        let restored = snapshot
            .as_ref()
            .map(Self::restore_snapshot)
            .unwrap_or_default();

        info!(
            database = %path.display(),
            restored = restored.len(),
            "Alert store ready"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            volatile: RwLock::new(restored),
            snapshot,
        })
    }

    /// A store backed by an in-memory database and no snapshot file.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            volatile: RwLock::new(Vec::new()),
            snapshot: None,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn restore_snapshot(snapshot: &SnapshotFile) -> Vec<Alert> {
        match snapshot.load() {
            SnapshotLoad::Loaded(alerts) => {
                debug!(count = alerts.len(), "Restored alert snapshot");
                alerts
            }
            SnapshotLoad::Missing | SnapshotLoad::Empty => Vec::new(),
            SnapshotLoad::Corrupt(e) => {
                warn!(
                    path = %snapshot.path().display(),
                    error = %e,
                    "Alert snapshot is corrupted or invalid, starting with an empty timeline"
                );
                Vec::new()
            }
        }
    }

    /// Accept a new alert stamped with the current local time.
    ///
    /// The durable row is written first; if that fails nothing is added to
    /// the volatile timeline and the error is returned.
    pub fn append(&self, message: &str, status: &str) -> Result<Alert, StoreError> {
        let alert = Alert::now(message, status);

        // Held across the whole append so durable and volatile order agree.
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO alerts (time, message, status) VALUES (?1, ?2, ?3)",
            params![alert.time_string(), alert.message, alert.status],
        )?;

        let timeline = {
            let mut volatile = self.volatile.write().unwrap_or_else(PoisonError::into_inner);
            volatile.push(alert.clone());
            self.snapshot.as_ref().map(|_| volatile.clone())
        };

        if let (Some(snapshot), Some(timeline)) = (&self.snapshot, timeline) {
            if let Err(e) = snapshot.save(&timeline) {
                warn!(
                    path = %snapshot.path().display(),
                    error = %e,
                    "Failed to rewrite alert snapshot"
                );
            }
        }
        drop(conn);

        info!(message = %alert.message, status = %alert.status, "Alert recorded");
        Ok(alert)
    }

    /// The full volatile timeline in insertion order.
    pub fn all_volatile(&self) -> Vec<Alert> {
        self.volatile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Message of the most recently accepted alert, system-wide.
    pub fn last_message(&self) -> Option<String> {
        self.volatile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|a| a.message.clone())
    }

    /// Number of alerts in the volatile timeline.
    pub fn len(&self) -> usize {
        self.volatile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `limit` most recent durable alerts, newest first.
    ///
    /// Rows whose time cannot be parsed are logged and skipped.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare_cached(
            "SELECT id, time, message, status FROM alerts ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, time, message, status)| {
                match row_to_alert(time, message, status) {
                    Ok(alert) => Some(alert),
                    Err(e) => {
                        warn!(row = id, error = %e, "Skipping unreadable history row");
                        None
                    }
                }
            })
            .collect())
    }

    /// Total number of durable rows.
    pub fn history_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_alert(time: String, message: String, status: String) -> Result<Alert, StoreError> {
    let parsed = parse_alert_time(&time).ok_or(StoreError::MalformedTime { value: time })?;
    Ok(Alert {
        time: parsed,
        message,
        status,
    })
}

/// Run [`AlertStore::append`] on the blocking pool.
pub async fn spawn_append(
    store: &Arc<AlertStore>,
    message: String,
    status: String,
) -> Result<Alert, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.append(&message, &status))
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
}

/// Run [`AlertStore::recent_history`] on the blocking pool.
pub async fn spawn_recent_history(
    store: &Arc<AlertStore>,
    limit: usize,
) -> Result<Vec<Alert>, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.recent_history(limit))
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
}
