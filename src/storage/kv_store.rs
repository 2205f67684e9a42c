// src/storage/kv_store.rs
//! Key-value persistence backends for the certificate ledger.
//!
//! The registry persists its whole ledger under one string key. Backends
//! implement [`KeyValueStore`] so the storage medium can change without
//! touching the stores built on top.
//!
//! # Backends
//! - [`MemoryStore`]: process-local map, lost on exit
//! - [`FileStore`]: one JSON file per key inside a data directory

use crate::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// String-keyed storage of serialized documents.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// In-memory backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File backend: `key` maps to `<dir>/<key>.json`.
///
/// The directory is created on first write. Writes land in a temporary
/// sibling file that is then renamed over the target, so readers never see
/// a half-written document.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let staging = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&staging, value)?;
        fs::rename(&staging, &target)?;
        log::debug!("wrote {} bytes to {}", value.len(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("decentre_certificates").unwrap(), None);

        store.set("decentre_certificates", "{}").unwrap();
        store.set("decentre_certificates", r#"{"a":1}"#).unwrap();
        assert_eq!(
            store.get("decentre_certificates").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_file_store_creates_directory_and_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let store = FileStore::new(&dir);

        assert_eq!(store.get("ledger").unwrap(), None);
        store.set("ledger", r#"{"x":true}"#).unwrap();

        assert!(store.path_for("ledger").exists());
        assert_eq!(store.get("ledger").unwrap().as_deref(), Some(r#"{"x":true}"#));

        // A second handle on the same directory sees the data
        let reopened = FileStore::new(&dir);
        assert_eq!(reopened.get("ledger").unwrap().as_deref(), Some(r#"{"x":true}"#));
    }

    #[test]
    fn test_boxed_store_delegates() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
