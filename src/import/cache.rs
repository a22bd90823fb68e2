//! Import memoization
//!
//! Keyed by a hash of the raw content plus an options version. Changing the
//! options bumps the version, which drops entries made under older options.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::converters::ImportResult;

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct ImportCache {
    entries: HashMap<(u64, u64), ImportResult>,
    version: u64,
    hits: u64,
    misses: u64,
}

pub fn content_hash(content: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Options changed; older results no longer apply
    pub fn bump_version(&mut self) {
        self.version += 1;
        let version = self.version;
        self.entries.retain(|(_, v), _| *v == version);
    }

    /// Cached result for the content, running `import` on a miss.
    /// Failures are not cached.
    pub fn get_or_import<F>(&mut self, content: &[u8], import: F) -> ImportResult
    where
        F: FnOnce(&[u8]) -> ImportResult,
    {
        let key = (content_hash(content), self.version);
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return hit.clone();
        }
        self.misses += 1;
        let result = import(content);
        if result.is_success() {
            self.entries.insert(key, result.clone());
        }
        result
    }

    /// Drop the entry for one content buffer; true if something was removed
    pub fn invalidate(&mut self, content: &[u8]) -> bool {
        let hash = content_hash(content);
        let before = self.entries.len();
        self.entries.retain(|(h, _), _| *h != hash);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
