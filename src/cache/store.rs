//! Cache storage backends.
//!
//! `CacheStore` is the contract the read path and the invalidation path share.
//! `MemoryStore` keeps entries in a bounded LRU inside the process.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;

use super::keys::glob_match;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failed during `{op}`: {message}")]
    Backend { op: &'static str, message: String },
    #[error("failed to encode cache value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            op,
            message: message.into(),
        }
    }
}

/// Key-value store holding serialized JSON values.
///
/// `get` distinguishes a miss (`None`) from a stored empty value, so empty lists
/// are cached like any other result.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Delete exact keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Delete every key matching a `*`/`?` glob, returning the deleted keys.
    async fn delete_pattern(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn flush_all(&self) -> Result<(), CacheError>;
}

pub struct MemoryStore {
    entries: RwLock<LruCache<String, String>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        // LRU reads reorder entries, so this takes the write side.
        Ok(rw_write(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        let removed = keys
            .iter()
            .filter(|key| entries.pop(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_pattern");
        let matched: Vec<String> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matched {
            entries.pop(key.as_str());
        }
        Ok(matched)
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "flush_all").clear();
        Ok(())
    }
}
