//! Durable homes for [`WateringState`].
//!
//! The JSON file is the default: small, human-readable, replaced atomically.
//! The SQLite store exists for installs that already keep other data in a
//! database file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};
use verdant_core::config::{StateBackend, StateConfig};

use crate::db::init_db;
use crate::error::PersistenceError;
use crate::state::{format_timestamp, WateringState};

/// Load/save seam for the watering state.
pub trait StateStore: Send {
    /// Read the persisted state. A missing record is an empty state.
    fn load(&self) -> Result<WateringState, PersistenceError>;

    /// Replace the persisted state with `state`.
    fn save(&mut self, state: &WateringState) -> Result<(), PersistenceError>;

    /// Where the state lives, for log lines.
    fn location(&self) -> String;
}

/// Open the store selected by `[state]` in the config.
pub fn open_store(config: &StateConfig) -> Result<Box<dyn StateStore>, PersistenceError> {
    match config.backend {
        StateBackend::Json => Ok(Box::new(JsonStateStore::new(&config.path))),
        StateBackend::Sqlite => Ok(Box::new(SqliteStateStore::open(&config.path)?)),
    }
}

// --- JSON file -------------------------------------------------------------

#[derive(Serialize)]
struct StateDocument {
    last_watered: BTreeMap<String, String>,
}

/// `{"last_watered": {"07:00": "2026-10-16T07:00:00"}}` in a single file.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<WateringState, PersistenceError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file yet; starting empty");
            return Ok(WateringState::new());
        }
        let text = std::fs::read_to_string(&self.path)?;

        // A half-written file must not stop the daemon: every entry it held
        // becomes "never watered".
        let doc: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable; starting empty");
                return Ok(WateringState::new());
            }
        };

        match doc.get("last_watered") {
            Some(serde_json::Value::Object(map)) => {
                let raw = map.iter().filter_map(|(id, value)| match value.as_str() {
                    Some(s) => Some((id.clone(), s.to_string())),
                    None => {
                        warn!(schedule = %id, "non-string last-watered value; treating entry as never watered");
                        None
                    }
                });
                Ok(WateringState::from_raw_entries(raw))
            }
            Some(serde_json::Value::Null) | None => Ok(WateringState::new()),
            Some(other) => {
                // Older layouts stored a single start-time string here.
                warn!(value = %other, "legacy last_watered layout ignored; starting empty");
                Ok(WateringState::new())
            }
        }
    }

    fn save(&mut self, state: &WateringState) -> Result<(), PersistenceError> {
        let doc = StateDocument {
            last_watered: state
                .iter()
                .map(|(id, at)| (id.to_string(), format_timestamp(at)))
                .collect(),
        };
        let body = serde_json::to_vec_pretty(&doc)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Write a sibling temp file and rename it over the target so a crash
        // leaves either the old or the new record, never a torn one.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// --- SQLite ----------------------------------------------------------------

/// One row per schedule entry in the `watering_state` table.
pub struct SqliteStateStore {
    conn: Connection,
    label: String,
}

impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, path.display().to_string())
    }

    pub fn with_connection(conn: Connection, label: impl Into<String>) -> Result<Self, PersistenceError> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            label: label.into(),
        })
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<WateringState, PersistenceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT schedule_id, last_watered FROM watering_state ORDER BY schedule_id")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .filter_map(|r| match r {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable watering_state row");
                    None
                }
            })
            .collect();
        Ok(WateringState::from_raw_entries(rows))
    }

    fn save(&mut self, state: &WateringState) -> Result<(), PersistenceError> {
        let now = format_timestamp(chrono::Local::now().naive_local());
        let tx = self.conn.transaction()?;
        for (id, at) in state.iter() {
            tx.execute(
                "INSERT INTO watering_state (schedule_id, last_watered, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(schedule_id) DO UPDATE
                 SET last_watered = excluded.last_watered, updated_at = excluded.updated_at",
                rusqlite::params![id, format_timestamp(at), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn location(&self) -> String {
        self.label.clone()
    }
}
