use std::collections::BTreeMap;
#[cfg(feature = "sqlite")]
use std::path::Path;

#[cfg(feature = "sqlite")]
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::TsuzukiError;
use crate::models::StoredProgressRecord;

#[cfg(feature = "sqlite")]
const SCHEMA_V1: &str = include_str!("../../../migrations/001_progress.sql");

/// Name of the tracked-key index in `store_meta`.
#[cfg(feature = "sqlite")]
const TRACKED_KEYS: &str = "tracked_keys";

/// Read/write contract of the persistent progress store.
///
/// Records are stored one per content key; a separate index lists the keys
/// currently tracked.
pub trait ProgressStore {
    fn get(&self, key: &str) -> Result<Option<StoredProgressRecord>, TsuzukiError>;

    /// Insert or overwrite the record under its `content_key`.
    fn put(&mut self, record: &StoredProgressRecord) -> Result<(), TsuzukiError>;

    /// Remove a record. Returns whether it existed.
    fn remove(&mut self, key: &str) -> Result<bool, TsuzukiError>;

    fn tracked_keys(&self) -> Result<Vec<String>, TsuzukiError>;

    fn set_tracked_keys(&mut self, keys: &[String]) -> Result<(), TsuzukiError>;

    /// Every record in the store, indexed or not.
    fn all_records(&self) -> Result<Vec<StoredProgressRecord>, TsuzukiError>;
}

/// SQLite-backed progress store.
#[cfg(feature = "sqlite")]
pub struct Storage {
    conn: Connection,
}

#[cfg(feature = "sqlite")]
impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, TsuzukiError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, TsuzukiError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }
}

#[cfg(feature = "sqlite")]
impl ProgressStore for Storage {
    fn get(&self, key: &str) -> Result<Option<StoredProgressRecord>, TsuzukiError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM progress WHERE content_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, record: &StoredProgressRecord) -> Result<(), TsuzukiError> {
        let json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO progress (content_key, record, last_watched)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(content_key) DO UPDATE SET
               record = excluded.record,
               last_watched = excluded.last_watched",
            params![record.content_key, json, record.last_watched.timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, TsuzukiError> {
        let n = self
            .conn
            .execute("DELETE FROM progress WHERE content_key = ?1", params![key])?;
        Ok(n > 0)
    }

    fn tracked_keys(&self) -> Result<Vec<String>, TsuzukiError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_meta WHERE name = ?1",
                params![TRACKED_KEYS],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn set_tracked_keys(&mut self, keys: &[String]) -> Result<(), TsuzukiError> {
        let json = serde_json::to_string(keys)?;
        self.conn.execute(
            "INSERT INTO store_meta (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![TRACKED_KEYS, json],
        )?;
        Ok(())
    }

    fn all_records(&self) -> Result<Vec<StoredProgressRecord>, TsuzukiError> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_key, record FROM progress ORDER BY last_watched DESC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .filter_map(|r| r.ok())
            .filter_map(|(key, json)| match serde_json::from_str(&json) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable progress record");
                    None
                }
            })
            .collect();
        Ok(rows)
    }
}

/// In-process store, used by tests and by hosts without a database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, StoredProgressRecord>,
    tracked: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ProgressStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredProgressRecord>, TsuzukiError> {
        Ok(self.records.get(key).cloned())
    }

    fn put(&mut self, record: &StoredProgressRecord) -> Result<(), TsuzukiError> {
        self.records
            .insert(record.content_key.clone(), record.clone());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, TsuzukiError> {
        Ok(self.records.remove(key).is_some())
    }

    fn tracked_keys(&self) -> Result<Vec<String>, TsuzukiError> {
        Ok(self.tracked.clone())
    }

    fn set_tracked_keys(&mut self, keys: &[String]) -> Result<(), TsuzukiError> {
        self.tracked = keys.to_vec();
        Ok(())
    }

    fn all_records(&self) -> Result<Vec<StoredProgressRecord>, TsuzukiError> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.last_watched.cmp(&a.last_watched));
        Ok(records)
    }
}

#[cfg(feature = "sqlite")]
fn run_migrations(conn: &Connection) -> Result<(), TsuzukiError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use chrono::{DateTime, Utc};

    fn record(key: &str, millis: i64) -> StoredProgressRecord {
        StoredProgressRecord {
            content_key: key.into(),
            url: format!("https://example.com/{key}"),
            title: key.into(),
            current_time: 100.0,
            duration: 1000.0,
            percent_complete: 10.0,
            last_watched: DateTime::<Utc>::from_timestamp_millis(millis).unwrap(),
            platform: "Example".into(),
            content_type: ContentType::Movie,
            episode_number: None,
            season_number: None,
            series_title: None,
            episode_name: None,
            original_title: None,
        }
    }

    fn exercise(store: &mut dyn ProgressStore) {
        assert!(store.get("content_1").unwrap().is_none());
        store.put(&record("content_1", 1_000)).unwrap();
        store.put(&record("content_2", 2_000)).unwrap();

        let mut updated = record("content_1", 3_000);
        updated.current_time = 500.0;
        store.put(&updated).unwrap();
        assert_eq!(store.get("content_1").unwrap().unwrap().current_time, 500.0);

        let all = store.all_records().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content_key, "content_1", "newest first");

        store
            .set_tracked_keys(&["content_1".into(), "content_2".into()])
            .unwrap();
        assert_eq!(store.tracked_keys().unwrap().len(), 2);

        assert!(store.remove("content_2").unwrap());
        assert!(!store.remove("content_2").unwrap());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store() {
        let mut storage = Storage::open_memory().unwrap();
        exercise(&mut storage);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        exercise(&mut store);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.db");
        {
            let mut storage = Storage::open(&path).unwrap();
            storage.put(&record("content_9", 9_000)).unwrap();
            storage.set_tracked_keys(&["content_9".into()]).unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.tracked_keys().unwrap(), vec!["content_9".to_string()]);
        assert_eq!(storage.get("content_9").unwrap().unwrap().title, "content_9");
    }
}
