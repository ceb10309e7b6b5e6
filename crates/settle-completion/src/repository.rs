//! Idempotent repositories recording which resources were already consumed.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::RepositoryResult;
use crate::model::ResourceKey;

/// Number of keys retained when no capacity is configured.
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;

/// Set-like store of resource keys already consumed.
///
/// Implementations are shared across every completion and every upstream
/// consumer, so all operations must be safe to call concurrently.
pub trait IdempotentRepository: Send + Sync {
    /// Record `key`; returns `true` when it was not present before.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be recorded.
    fn add(&self, key: &ResourceKey) -> RepositoryResult<bool>;

    /// Whether `key` has been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be queried.
    fn contains(&self, key: &ResourceKey) -> RepositoryResult<bool>;

    /// Forget `key`; returns `true` when it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be updated.
    fn remove(&self, key: &ResourceKey) -> RepositoryResult<bool>;
}

/// Bounded set of keys that evicts the least recently added entry.
#[derive(Debug, Clone)]
pub struct KeyCache {
    order: VecDeque<ResourceKey>,
    members: HashSet<ResourceKey>,
    capacity: usize,
}

impl KeyCache {
    /// Empty cache holding at most `capacity` keys (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert `key`, refreshing its recency when already present.
    ///
    /// Returns `true` when the key was not present before.
    pub fn insert(&mut self, key: ResourceKey) -> bool {
        if self.members.contains(&key) {
            if let Some(position) = self.order.iter().position(|existing| existing == &key) {
                let _ = self.order.remove(position);
            }
            self.order.push_back(key);
            return false;
        }

        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    let _ = self.members.remove(&evicted);
                }
                None => break,
            }
        }
        let _ = self.members.insert(key.clone());
        self.order.push_back(key);
        true
    }

    /// Whether `key` is currently retained.
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.members.contains(key)
    }

    /// Remove `key`; returns `true` when it was present.
    pub fn remove(&mut self, key: &ResourceKey) -> bool {
        if !self.members.remove(key) {
            return false;
        }
        self.order.retain(|existing| existing != key);
        true
    }

    /// Number of retained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no keys are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of retained keys.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained keys from least to most recently added.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceKey> {
        self.order.iter()
    }
}

/// Process-local idempotent repository backed by a [`KeyCache`].
#[derive(Debug)]
pub struct MemoryIdempotentRepository {
    cache: Mutex<KeyCache>,
}

impl MemoryIdempotentRepository {
    /// Repository retaining at most `capacity` keys.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(KeyCache::with_capacity(capacity)),
        }
    }

    /// Number of retained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Whether no keys are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_cache().is_empty()
    }

    fn lock_cache(&self) -> MutexGuard<'_, KeyCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryIdempotentRepository {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl IdempotentRepository for MemoryIdempotentRepository {
    fn add(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        Ok(self.lock_cache().insert(key.clone()))
    }

    fn contains(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        Ok(self.lock_cache().contains(key))
    }

    fn remove(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        Ok(self.lock_cache().remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use std::sync::Arc;
    use std::thread;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::from(name)
    }

    #[test]
    fn key_cache_evicts_least_recently_added() {
        let mut cache = KeyCache::with_capacity(2);
        assert!(cache.insert(key("a")));
        assert!(cache.insert(key("b")));
        assert!(!cache.insert(key("a")));
        assert!(cache.insert(key("c")));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        let order: Vec<&str> = cache.iter().map(ResourceKey::as_str).collect();
        assert_eq!(order, vec!["a", "c"]);
    }

    #[test]
    fn key_cache_remove_and_zero_capacity() {
        let mut cache = KeyCache::with_capacity(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.insert(key("a")));
        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn memory_repository_add_is_idempotent() -> Result<(), RepositoryError> {
        let repository = MemoryIdempotentRepository::default();
        assert!(repository.add(&key("invoice-42.csv"))?);
        assert!(!repository.add(&key("invoice-42.csv"))?);
        assert!(repository.contains(&key("invoice-42.csv"))?);
        assert_eq!(repository.len(), 1);
        assert!(repository.remove(&key("invoice-42.csv"))?);
        assert!(repository.is_empty());
        Ok(())
    }

    #[test]
    fn memory_repository_tolerates_concurrent_writers() -> Result<(), RepositoryError> {
        let repository = Arc::new(MemoryIdempotentRepository::with_capacity(256));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let repository = Arc::clone(&repository);
                thread::spawn(move || {
                    for index in 0..16 {
                        let _ = repository.add(&key(&format!("w{worker}-{index}.csv")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        assert_eq!(repository.len(), 128);
        assert!(repository.contains(&key("w7-15.csv"))?);
        Ok(())
    }
}
