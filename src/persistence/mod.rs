pub mod route;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

pub use route::{attach_route_observer, PersistedRoute, RoutePersistence};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage contents are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value storage scoped to one client profile
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Ephemeral store, lost when the process exits
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON object persisted to a single file; every write rewrites the file
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        tracing::debug!("Opened state file {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated file behind
        let content = serde_json::to_string_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    // Memory only changes once the file holds the new contents
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }

        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", json!({"a": 1})).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!({"a": 1})));
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("route.last", json!("/athletes")).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("route.last").unwrap(), Some(json!("/athletes")));

        reopened.remove("route.last").unwrap();
        let again = FileStore::open(&path).unwrap();
        assert!(again.get("route.last").unwrap().is_none());
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("session.access_token", json!("token")).unwrap();

        // A directory squatting on the staging file makes every flush fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(store.set("cache.pending", json!([1])).is_err());
        assert!(store.get("cache.pending").unwrap().is_none());

        assert!(store.remove("session.access_token").is_err());
        assert_eq!(store.get("session.access_token").unwrap(), Some(json!("token")));

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("session.access_token").unwrap(), Some(json!("token")));
        assert!(reopened.get("cache.pending").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StorageError::Corrupt(_))));
    }
}
