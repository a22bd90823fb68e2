//! Persistence collaborator
//!
//! The engine only needs `get`/`put` on opaque bytes. [`MemoryStore`] backs
//! tests and the browser session; [`DirectoryStore`] keeps one file per key.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

use crate::converters::json::{from_json, to_json};
use crate::converters::ImportResult;
use crate::import::ImportPipeline;
use crate::models::Score;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("stored score is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key-value contract for raw score bytes
pub trait KeyValueStore: Send + Sync {
    /// Bytes stored under `key`; `Ok(None)` when absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes, replacing any previous value
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Keys are single path components: no separators, no dot-only names
fn check_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        check_key(key)?;
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// One file per key under a base directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open a store, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        // write then rename so readers never see a partial file
        let tmp = self.root.join(format!(".{}.tmp", key));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Store a score as JSON under `key`
pub fn save_score(store: &dyn KeyValueStore, key: &str, score: &Score) -> Result<()> {
    let json = to_json(score)?;
    store.put(key, json.as_bytes())?;
    log::debug!("saved score {:?} ({} bytes)", key, json.len());
    Ok(())
}

/// Load a score previously written by [`save_score`]
pub fn load_score(store: &dyn KeyValueStore, key: &str) -> Result<Option<Score>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(Some(from_json(&text)?))
}

/// Run stored bytes of any supported format through the import pipeline.
/// `None` when nothing is stored under the key.
pub fn import_from_store(
    store: &dyn KeyValueStore,
    key: &str,
    pipeline: &ImportPipeline,
) -> Result<Option<ImportResult>> {
    Ok(store
        .get(key)?
        .map(|bytes| pipeline.import_file(key, &bytes)))
}
