//! Cache stores shared by the extraction pipeline and the entity lookup.
//!
//! A store maps a string key (content hash, normalized tax id) to a value.
//! Entries are written once and never updated in place.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Key-value cache interface.
pub trait CacheStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    fn put(&self, key: &str, value: V) -> Result<(), CacheError>;
}

/// Process-lifetime in-memory store.
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: V) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Directory of JSON files, one per key, fronted by a memory layer.
///
/// Files are written to a temporary file in the same directory and renamed
/// into place, so readers never observe a partial entry.
pub struct JsonDirStore<V> {
    dir: PathBuf,
    memory: MemoryStore<V>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> JsonDirStore<V> {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!("Opened cache directory {}", dir.display());
        Ok(Self {
            dir,
            memory: MemoryStore::new(),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl<V> CacheStore<V> for JsonDirStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        if let Some(hit) = self.memory.get(key) {
            return Some(hit);
        }

        let path = self.path_for(key);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<V>(&content) {
            Ok(value) => {
                let _ = self.memory.put(key, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: V) -> Result<(), CacheError> {
        let content = serde_json::to_vec_pretty(&value)?;

        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(&content)?;
        file.persist(self.path_for(key)).map_err(|e| CacheError::Io(e.error))?;

        self.memory.put(key, value)
    }
}
