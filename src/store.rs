use crate::db::Database;
use crate::error::ServiceResult;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const KEY_SESSION: &str = "session.workout";
pub const KEY_EXERCISE_INDEX: &str = "session.exercise_index";
pub const KEY_WORKOUT_TIMER: &str = "timer.workout";
pub const KEY_REST_TIMER: &str = "timer.rest";
pub const KEY_LAST_WEIGHTS: &str = "exercise.last_weights";

/// Durable key/value persistence of opaque blobs
pub trait DurableStore {
    fn put(&self, key: &str, value: &[u8]) -> ServiceResult<()>;
    fn get(&self, key: &str) -> ServiceResult<Option<Vec<u8>>>;
    fn delete(&self, key: &str) -> ServiceResult<()>;
}

/// In-process store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> ServiceResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> ServiceResult<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn delete(&self, key: &str) -> ServiceResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Key/value table inside the shared SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DurableStore for SqliteStore {
    fn put(&self, key: &str, value: &[u8]) -> ServiceResult<()> {
        self.db.connection().execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> ServiceResult<Option<Vec<u8>>> {
        let value = self
            .db
            .connection()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> ServiceResult<()> {
        self.db
            .connection()
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// Read a JSON value, treating unreadable or undecodable data as absent.
///
/// A blob that fails to decode is deleted so the next launch starts clean.
pub fn load_json<T: DeserializeOwned>(store: &dyn DurableStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read from durable store");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "discarding undecodable blob");
            if let Err(err) = store.delete(key) {
                tracing::warn!(key, error = %err, "failed to clear undecodable blob");
            }
            None
        }
    }
}

/// Write a JSON value; failures are logged, never returned.
pub fn save_json<T: Serialize>(store: &dyn DurableStore, key: &str, value: &T) -> bool {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to encode blob");
            return false;
        }
    };
    match store.put(key, &bytes) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to persist blob");
            false
        }
    }
}

pub fn remove(store: &dyn DurableStore, key: &str) {
    if let Err(err) = store.delete(key) {
        tracing::warn!(key, error = %err, "failed to delete blob");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn sample() -> Sample {
        Sample {
            name: "bench".into(),
            count: 3,
        }
    }

    #[test]
    fn memory_store_put_get_delete() {
        let store = MemoryStore::new();
        store.put("a", b"one").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"one".to_vec()));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.put("k", b"v").unwrap();
        assert!(handle.contains("k"));
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn sqlite_store_upserts() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        store.put("k", b"first").unwrap();
        store.put("k", b"second").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"second".to_vec()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.delete("missing").unwrap();
    }

    #[test]
    fn json_helpers_round_trip() {
        let store = MemoryStore::new();
        assert!(save_json(&store, "s", &sample()));
        assert_eq!(load_json::<Sample>(&store, "s"), Some(sample()));
    }

    #[test]
    fn undecodable_blob_is_cleared() {
        let store = MemoryStore::new();
        store.put("s", b"{not json").unwrap();
        assert_eq!(load_json::<Sample>(&store, "s"), None);
        assert!(!store.contains("s"));
    }

    struct FailingStore;

    impl DurableStore for FailingStore {
        fn put(&self, _key: &str, _value: &[u8]) -> ServiceResult<()> {
            Err(ServiceError::Storage("disk full".into()))
        }
        fn get(&self, _key: &str) -> ServiceResult<Option<Vec<u8>>> {
            Err(ServiceError::Storage("io".into()))
        }
        fn delete(&self, _key: &str) -> ServiceResult<()> {
            Err(ServiceError::Storage("io".into()))
        }
    }

    #[test]
    fn failures_are_swallowed() {
        assert!(!save_json(&FailingStore, "s", &sample()));
        assert_eq!(load_json::<Sample>(&FailingStore, "s"), None);
        remove(&FailingStore, "s");
    }
}
