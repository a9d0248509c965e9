//! Durable key-value sinks and the workflow persistence adapter.
//!
//! A sink only moves strings in and out under a key. The adapter owns the
//! record format, versioning and integrity checks on top of it.

mod migration;
mod persistence;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{StorageError, StorageResult};

pub use migration::{migrate, LEGACY_STATE_VERSION};
pub use persistence::{state_key, PersistenceAdapter, STATE_KEY_PREFIX};

/// A durable string store keyed by name.
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Read the value for `key`, `None` when absent.
    async fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: String) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-process sink. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for a key (for inspection in tests and tools).
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Put a raw value, bypassing the adapter.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(key.into(), value.into());
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StateSink for MemoryStore {
    async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: String) -> StorageResult<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Sink storing one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl StateSink for FileStore {
    async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, key: &str, value: String) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Rename over the target so readers never see a partial record
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.read("k").await.unwrap().is_none());

        store.write("k", "v".to_string()).await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("v"));

        let shared = store.clone();
        shared.remove("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert!(store.read("workflow-state-demo").await.unwrap().is_none());

        store.write("workflow-state-demo", "{}".to_string()).await.unwrap();
        assert!(store.path_for("workflow-state-demo").exists());
        assert_eq!(store.read("workflow-state-demo").await.unwrap().as_deref(), Some("{}"));

        store.remove("workflow-state-demo").await.unwrap();
        store.remove("workflow-state-demo").await.unwrap();
        assert!(store.read("workflow-state-demo").await.unwrap().is_none());
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let store = FileStore::new("/tmp/stepwise");
        let path = store.path_for("workflow-state-../../etc");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "workflow-state-______etc.json");
    }
}
