//! Storage trait and the in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{CacheEntry, StorageError};

/// Trait for cache storage backends.
///
/// Generation names are opaque strings. Generations are listed in creation
/// order, which is also the order [`CacheStorage::match_any`] searches them.
pub trait CacheStorage: Send + Sync {
    /// Creates the generation if it does not exist yet.
    fn open(&self, generation: &str) -> Result<(), StorageError>;

    /// Stores `entry` under its key, replacing any previous entry.
    /// Creates the generation when it is missing.
    fn put(&self, generation: &str, entry: CacheEntry) -> Result<(), StorageError>;

    /// Looks `key` up in one generation. A missing generation is a miss.
    fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, StorageError>;

    /// Lists generation names in creation order.
    fn generations(&self) -> Result<Vec<String>, StorageError>;

    /// Deletes a generation with all of its entries.
    ///
    /// Returns `true` if the generation existed.
    fn delete(&self, generation: &str) -> Result<bool, StorageError>;

    /// Lists the keys stored in a generation.
    fn keys(&self, generation: &str) -> Result<Vec<String>, StorageError>;

    /// Looks `key` up across every generation, oldest first.
    fn match_any(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        for generation in self.generations()? {
            if let Some(entry) = self.get(&generation, key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    generations: HashMap<String, HashMap<String, CacheEntry>>,
}

impl Inner {
    fn ensure(&mut self, generation: &str) -> &mut HashMap<String, CacheEntry> {
        if !self.generations.contains_key(generation) {
            self.order.push(generation.to_owned());
        }
        self.generations.entry(generation.to_owned()).or_default()
    }
}

/// In-process storage guarded by a single reader-writer lock.
///
/// # Examples
///
/// ```
/// use swcache::cache::{CacheEntry, CacheStorage, MemoryStorage};
/// use swcache::http::{Response, StatusCode};
///
/// let storage = MemoryStorage::new();
/// let entry = CacheEntry::new("GET https://example.com/", Response::new(StatusCode::OK));
/// storage.put("v1", entry).unwrap();
///
/// assert!(storage.get("v1", "GET https://example.com/").unwrap().is_some());
/// assert!(storage.get("v0", "GET https://example.com/").unwrap().is_none());
/// ```
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn open(&self, generation: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner.ensure(generation);
        Ok(())
    }

    fn put(&self, generation: &str, entry: CacheEntry) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner
            .ensure(generation)
            .insert(entry.key().to_owned(), entry);
        Ok(())
    }

    fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner
            .generations
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn generations(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.order.clone())
    }

    fn delete(&self, generation: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner.order.retain(|name| name != generation);
        Ok(inner.generations.remove(generation).is_some())
    }

    fn keys(&self, generation: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        let mut keys: Vec<String> = inner
            .generations
            .get(generation)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
