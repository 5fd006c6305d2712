//! Persisted entity store for offline/demo mode.
//!
//! Each collection lives under one key of a [`KeyValueStore`] as a JSON
//! array. Plain reads never fail: missing, unreadable or corrupt data is
//! logged and treated as an empty collection. Writers use the strict
//! [`PersistedStore::load`] instead.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::models::Collection;

/// Synchronous string key-value storage, one key per collection.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub use memory::MemoryKeyValueStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::KeyValueStore;
    use crate::error::{Result, TrackError};

    /// In-process storage. Can be switched off to behave like a missing backend.
    #[derive(Default)]
    pub struct MemoryKeyValueStore {
        entries: Mutex<HashMap<String, String>>,
        unavailable: AtomicBool,
    }

    impl MemoryKeyValueStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(TrackError::Storage("storage is unavailable".to_string()));
            }
            self.entries
                .lock()
                .map_err(|_| TrackError::Storage("storage lock poisoned".to_string()))
        }
    }

    impl KeyValueStore for MemoryKeyValueStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries()?.get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.entries()?.insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.entries()?.remove(key);
            Ok(())
        }
    }
}

pub struct PersistedStore<K: ?Sized> {
    kv: Box<K>,
}

impl<K: KeyValueStore + ?Sized> PersistedStore<K> {
    pub fn new(kv: Box<K>) -> Self {
        Self { kv }
    }

    #[cfg(test)]
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// All records of `collection` in insertion order; empty on any failure.
    pub fn get_all(&self, collection: Collection) -> Vec<Value> {
        let key = collection.storage_key();
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Local storage unreadable, using empty collection");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Corrupt local collection, using empty collection");
                Vec::new()
            }
        }
    }

    /// All records of `collection`, failing on unreadable or corrupt data.
    /// Writers read through this so a bad read is never saved back over the collection.
    pub fn load(&self, collection: Collection) -> Result<Vec<Value>> {
        match self.kv.get(&collection.storage_key())? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the whole collection with `records`.
    pub fn save_all(&self, collection: Collection, records: &[Value]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.kv.set(&collection.storage_key(), &raw)?;
        tracing::debug!(collection = %collection, count = records.len(), "Saved local collection");
        Ok(())
    }

    pub fn clear(&self, collection: Collection) -> Result<()> {
        self.kv.remove(&collection.storage_key())
    }
}
