//! Persistence port for the parameter store.
//!
//! The parameter set is persisted as one opaque JSON blob under a well-known
//! key. All failures at this layer are best-effort: callers log and carry on
//! with in-memory state.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::ParameterSet;

/// The single well-known key the blob lives under.
const STORAGE_KEY: &str = "calibration_parameters";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS calibration_store (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Where parameter sets are loaded from and saved to.
pub trait ParameterStorage: Send {
    /// Read the persisted set. `Ok(None)` means nothing usable is stored
    /// (missing or malformed blobs are treated as absent).
    fn load(&self) -> Result<Option<ParameterSet>>;

    /// Write the set, replacing whatever was stored before.
    fn save(&self, set: &ParameterSet) -> Result<()>;
}

/// SQLite-backed storage (single connection behind a mutex).
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path and run the idempotent
    /// schema migration.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening calibration store at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(SqliteStorage {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl ParameterStorage for SqliteStorage {
    fn load(&self) -> Result<Option<ParameterSet>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM calibration_store WHERE key = ?1",
                params![STORAGE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<ParameterSet>(&raw) {
            Ok(set) => Ok(Some(set)),
            Err(err) => {
                // Malformed content is treated as absent; the next save
                // replaces it.
                warn!("ignoring malformed calibration parameter blob: {err}");
                Ok(None)
            }
        }
    }

    fn save(&self, set: &ParameterSet) -> Result<()> {
        let blob = serde_json::to_string(set).context("serializing calibration parameters")?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO calibration_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![STORAGE_KEY, blob, Utc::now()],
        )?;
        Ok(())
    }
}

/// In-memory storage: the injectable test double, also used when no durable
/// store is wanted. Clones share the same underlying blob.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterStorage for MemoryStorage {
    fn load(&self) -> Result<Option<ParameterSet>> {
        let blob = self.blob.lock().unwrap();
        match blob.as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, set: &ParameterSet) -> Result<()> {
        let raw = serde_json::to_string(set)?;
        *self.blob.lock().unwrap() = Some(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CalibrationParameters, ParameterSource};
    use std::collections::HashMap;

    fn overridden_set() -> ParameterSet {
        let mut values = CalibrationParameters::default();
        values.temperature = 1.3;
        values.driver_bias.insert("Verstappen".into(), 0.015);
        let mut per_team = HashMap::new();
        per_team.insert("Ferrari".into(), 1.1);
        values.driver_team_multiplier.insert("Hamilton".into(), per_team);
        ParameterSet {
            source: ParameterSource::Overridden,
            values,
        }
    }

    #[test]
    fn memory_storage_round_trips_the_set() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());

        let set = overridden_set();
        storage.save(&set).unwrap();
        assert_eq!(storage.load().unwrap(), Some(set));
    }

    #[test]
    fn sqlite_storage_round_trips_the_set() {
        let storage = SqliteStorage::open(":memory:").unwrap();
        assert!(storage.load().unwrap().is_none());

        let set = overridden_set();
        storage.save(&set).unwrap();
        assert_eq!(storage.load().unwrap(), Some(set.clone()));

        // Saving again overwrites under the same key.
        let fresh = ParameterSet::builtin();
        storage.save(&fresh).unwrap();
        assert_eq!(storage.load().unwrap(), Some(fresh));
    }

    #[test]
    fn malformed_sqlite_blob_is_treated_as_absent() {
        let storage = SqliteStorage::open(":memory:").unwrap();
        {
            let conn = storage.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO calibration_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![STORAGE_KEY, "{not json", Utc::now()],
            )
            .unwrap();
        }
        assert!(storage.load().unwrap().is_none());
    }
}
