//! Persistent key-value storage for calibration form fields
//!
//! The workflow never touches a global store. It receives a
//! `KeyValueStore` at construction time, which keeps it testable with
//! `MemoryStore` or the `mockall` generated `MockKeyValueStore`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use calibration_tools::storage::{JsonFileStore, KeyValueStore};
//!
//! let store = JsonFileStore::open(".calibration-tools/storage.json")?;
//! store.set("extrudeTemp", "205")?;
//! assert_eq!(store.get("extrudeTemp").as_deref(), Some("205"));
//! # Ok::<(), calibration_tools::storage::StorageError>(())
//! ```
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String-keyed, string-valued store written synchronously on every `set`
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, handy for simulating a previous session
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The whole file is rewritten on every `set`. A missing file is an empty
/// store; an unreadable or corrupt one is logged and treated as empty so that
/// callers fall back to their defaults.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&raw) {
                Ok(values) => values
                    .into_iter()
                    .map(|(key, value)| {
                        let text = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (key, text)
                    })
                    .collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt storage file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened key-value store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("extrudeTemp"), None);

        store.set("extrudeTemp", "210").unwrap();
        assert_eq!(store.get("extrudeTemp").as_deref(), Some("210"));

        store.set("extrudeTemp", "215").unwrap();
        assert_eq!(store.get("extrudeTemp").as_deref(), Some("215"));
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("markLength", "118.5").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("markLength").as_deref(), Some("118.5"));
    }

    #[test]
    fn test_json_store_treats_corrupt_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("extrudeTemp"), None);

        // Writing replaces the corrupt content
        store.set("extrudeTemp", "200").unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("extrudeTemp").as_deref(), Some("200"));
    }

    #[test]
    fn test_json_store_accepts_numeric_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"extrudeSpeed": 90}"#).unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("extrudeSpeed").as_deref(), Some("90"));
    }

    #[test]
    fn test_mock_store_expectations() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_get()
            .with(eq("extrudeLength"))
            .times(1)
            .returning(|_| Some("95".to_string()));
        mock.expect_set()
            .with(eq("extrudeLength"), eq("100"))
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(mock.get("extrudeLength").as_deref(), Some("95"));
        mock.set("extrudeLength", "100").unwrap();
    }
}
