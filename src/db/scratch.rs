use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Flat string-keyed namespace of JSON values. Last write wins; clones share the namespace.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScratchStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scratch (
               key TEXT PRIMARY KEY,
               value_json TEXT NOT NULL,
               updated_at TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        let value_json = serde_json::to_string(value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scratch (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key, value_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Same as [`ScratchStore::set`]: the stored value is replaced, never merged.
    pub fn update<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        self.set(key, value)
    }

    /// Returns the stored value, or `{}` when the key is absent or its content does not parse.
    pub fn get(&self, key: &str) -> AppResult<Value> {
        let Some(raw) = self.read_raw(key)? else {
            return Ok(empty_mapping());
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::warn!(key, error = %error, "discarding unparseable scratch value");
                Ok(empty_mapping())
            }
        }
    }

    /// Like `get`, but reports corrupted content instead of discarding it.
    pub fn get_checked(&self, key: &str) -> AppResult<Option<Value>> {
        let Some(raw) = self.read_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str::<Value>(&raw)
            .map(Some)
            .map_err(|error| {
                AppError::Internal(format!("scratch value for {:?} is corrupted: {}", key, error))
            })
    }

    /// Typed read; falls back to `T::default()` whenever `get` would not yield a `T`.
    pub fn get_as<T: DeserializeOwned + Default>(&self, key: &str) -> AppResult<T> {
        Ok(serde_json::from_value(self.get(key)?).unwrap_or_default())
    }

    pub fn delete(&self, key: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM scratch WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn keys(&self) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT key FROM scratch ORDER BY key ASC")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn read_raw(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM scratch WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("scratch mutex poisoned".to_string()))
    }
}

fn empty_mapping() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::ScratchStore;
    use crate::errors::AppError;
    use serde_json::json;

    fn write_raw(store: &ScratchStore, key: &str, raw: &str) {
        let conn = store.lock().expect("lock");
        conn.execute(
            "INSERT INTO scratch (key, value_json, updated_at) VALUES (?1, ?2, 'now')",
            rusqlite::params![key, raw],
        )
        .expect("raw insert");
    }

    #[test]
    fn missing_key_reads_as_empty_mapping() {
        let store = ScratchStore::open_in_memory().expect("store");
        assert_eq!(store.get("never-set").expect("get"), json!({}));
        assert_eq!(store.get_checked("never-set").expect("checked"), None);
    }

    #[test]
    fn set_overwrites_and_update_does_not_merge() {
        let store = ScratchStore::open_in_memory().expect("store");
        store.set("prefs", &json!({ "a": 1, "b": 2 })).expect("set");
        store.set("prefs", &json!({ "a": 5 })).expect("overwrite");
        assert_eq!(store.get("prefs").expect("get"), json!({ "a": 5 }));

        store.update("prefs", &json!({ "c": 3 })).expect("update");
        assert_eq!(store.get("prefs").expect("get"), json!({ "c": 3 }));
    }

    #[test]
    fn delete_removes_and_tolerates_absent_keys() {
        let store = ScratchStore::open_in_memory().expect("store");
        store.set("draft", "hello").expect("set");
        store.delete("draft").expect("delete");
        store.delete("draft").expect("delete again");
        assert_eq!(store.get("draft").expect("get"), json!({}));
        assert!(store.keys().expect("keys").is_empty());
    }

    #[test]
    fn corrupted_value_is_discarded_by_get_but_reported_by_get_checked() {
        let store = ScratchStore::open_in_memory().expect("store");
        write_raw(&store, "broken", "{not json");

        assert_eq!(store.get("broken").expect("get"), json!({}));
        assert!(matches!(store.get_checked("broken"), Err(AppError::Internal(_))));
    }

    #[test]
    fn typed_reads_fall_back_to_default() {
        let store = ScratchStore::open_in_memory().expect("store");
        assert_eq!(store.get_as::<String>("draft").expect("missing"), "");
        store.set("draft", "text").expect("set");
        assert_eq!(store.get_as::<String>("draft").expect("present"), "text");
    }

    #[test]
    fn values_outlive_the_handle_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scratch.sqlite");
        {
            let store = ScratchStore::open(&path).expect("store");
            store.set("n", &42).expect("set");
        }
        let reopened = ScratchStore::open(&path).expect("reopen");
        assert_eq!(reopened.get("n").expect("get"), json!(42));
    }

    #[test]
    fn clones_share_one_namespace() {
        let store = ScratchStore::open_in_memory().expect("store");
        let other = store.clone();
        other.set("shared", &true).expect("set");
        assert_eq!(store.get("shared").expect("get"), json!(true));
        assert_eq!(store.keys().expect("keys"), vec!["shared".to_string()]);
    }
}
