//! Client-side stores wiped by a forced update.
//!
//! All three stores are treated as disposable: they hold cached responses and
//! ephemeral UI state, never the source of truth.

#[cfg(test)]
use std::{
    collections::{BTreeSet, HashSet},
    sync::Mutex,
};
use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache {0} could not be deleted")]
    CacheDelete(String),
    #[error("{0} storage unavailable")]
    Unavailable(&'static str),
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Names of every entry in the structured cache store
    async fn list_caches(&self) -> Result<Vec<String>, StorageError>;
    /// Returns whether the cache existed
    async fn delete_cache(&self, name: &str) -> Result<bool, StorageError>;
    async fn clear_persistent(&self) -> Result<(), StorageError>;
    async fn clear_session(&self) -> Result<(), StorageError>;
}

/// Operation recorded by [`MemoryStorage`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    ListCaches,
    DeleteCache(String),
    ClearPersistent,
    ClearSession,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MemoryState {
    caches: BTreeSet<String>,
    persistent: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
    failing_caches: HashSet<String>,
    fail_list: bool,
    fail_persistent: bool,
    fail_session: bool,
    ops: Vec<StorageOp>,
}

/// In-process stores with failure injection
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn add_cache(&self, name: &str) {
        self.with_state(|s| s.caches.insert(name.to_string()));
    }

    pub fn set_persistent(&self, key: &str, value: &str) {
        self.with_state(|s| s.persistent.insert(key.to_string(), value.to_string()));
    }

    pub fn set_session(&self, key: &str, value: &str) {
        self.with_state(|s| s.session.insert(key.to_string(), value.to_string()));
    }

    /// Make deleting `name` fail
    pub fn fail_cache_delete(&self, name: &str) {
        self.with_state(|s| s.failing_caches.insert(name.to_string()));
    }

    pub fn fail_cache_listing(&self) {
        self.with_state(|s| s.fail_list = true);
    }

    pub fn fail_persistent_clear(&self) {
        self.with_state(|s| s.fail_persistent = true);
    }

    pub fn fail_session_clear(&self) {
        self.with_state(|s| s.fail_session = true);
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.with_state(|s| s.caches.iter().cloned().collect())
    }

    pub fn persistent_len(&self) -> usize {
        self.with_state(|s| s.persistent.len())
    }

    pub fn session_len(&self) -> usize {
        self.with_state(|s| s.session.len())
    }

    pub fn ops(&self) -> Vec<StorageOp> {
        self.with_state(|s| s.ops.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn list_caches(&self) -> Result<Vec<String>, StorageError> {
        self.with_state(|s| {
            s.ops.push(StorageOp::ListCaches);
            if s.fail_list {
                return Err(StorageError::Unavailable("cache"));
            }
            Ok(s.caches.iter().cloned().collect())
        })
    }

    async fn delete_cache(&self, name: &str) -> Result<bool, StorageError> {
        self.with_state(|s| {
            s.ops.push(StorageOp::DeleteCache(name.to_string()));
            if s.failing_caches.contains(name) {
                return Err(StorageError::CacheDelete(name.to_string()));
            }
            Ok(s.caches.remove(name))
        })
    }

    async fn clear_persistent(&self) -> Result<(), StorageError> {
        self.with_state(|s| {
            s.ops.push(StorageOp::ClearPersistent);
            if s.fail_persistent {
                return Err(StorageError::Unavailable("persistent"));
            }
            s.persistent.clear();
            Ok(())
        })
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        self.with_state(|s| {
            s.ops.push(StorageOp::ClearSession);
            if s.fail_session {
                return Err(StorageError::Unavailable("session"));
            }
            s.session.clear();
            Ok(())
        })
    }
}

/// Stores laid out under a directory:
/// `caches/<name>/` per cache entry, `local.json` and `session.json` for the
/// key-value stores.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    const CACHES_DIR: &'static str = "caches";
    const PERSISTENT_FILE: &'static str = "local.json";
    const SESSION_FILE: &'static str = "session.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn caches_dir(&self) -> PathBuf {
        self.root.join(Self::CACHES_DIR)
    }

    /// Create an empty cache entry
    pub async fn open_cache(&self, name: &str) -> Result<PathBuf, StorageError> {
        let path = self.caches_dir().join(name);
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    pub async fn set_persistent(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_item(Self::PERSISTENT_FILE, key, value).await
    }

    pub async fn set_session(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_item(Self::SESSION_FILE, key, value).await
    }

    pub async fn get_persistent(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_store(Self::PERSISTENT_FILE).await?.remove(key))
    }

    pub async fn get_session(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_store(Self::SESSION_FILE).await?.remove(key))
    }

    async fn read_store(&self, file: &str) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(self.root.join(file)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, file: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let mut store = self.read_store(file).await?;
        store.insert(key.to_string(), value.to_string());
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(file), serde_json::to_vec_pretty(&store)?).await?;
        Ok(())
    }

    async fn remove_store(&self, file: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.root.join(file)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageGateway for FsStorage {
    async fn list_caches(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(self.caches_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_cache(&self, name: &str) -> Result<bool, StorageError> {
        // Names come from list_caches; refuse anything that escapes the cache dir
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StorageError::CacheDelete(name.to_string()));
        }
        match fs::remove_dir_all(self.caches_dir().join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_persistent(&self) -> Result<(), StorageError> {
        self.remove_store(Self::PERSISTENT_FILE).await
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        self.remove_store(Self::SESSION_FILE).await
    }
}
