//! In-memory [`FastCache`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking. Values
//! live only as long as the process, which is enough for tests and for
//! hosts that pair it with a durable store.

use dashmap::DashMap;

use crate::storage::error::StorageError;
use crate::storage::fast_cache::{check_quota, FastCache};

/// Default capacity, matching the usual per-origin quota of a browser's
/// local storage.
pub const DEFAULT_FAST_CACHE_CAPACITY: u64 = 5 * 1024 * 1024;

/// In-memory fast cache with a byte capacity.
#[derive(Debug)]
pub struct MemoryFastCache {
    entries: DashMap<String, String>,
    capacity: Option<u64>,
}

impl MemoryFastCache {
    /// Creates an empty cache with [`DEFAULT_FAST_CACHE_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Some(DEFAULT_FAST_CACHE_CAPACITY))
    }

    /// Creates an empty cache holding at most `capacity` bytes of keys and
    /// values. `None` means unbounded.
    #[must_use]
    pub fn with_capacity(capacity: Option<u64>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// Configured capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryFastCache {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_cost(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

impl FastCache for MemoryFastCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_len = self
            .entries
            .get(key)
            .map_or(0, |v| entry_cost(key, v.value()));
        check_quota(
            self.capacity,
            self.used_bytes(),
            old_len,
            entry_cost(key, value),
        )?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry_cost(entry.key(), entry.value()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let cache = MemoryFastCache::new();

        cache.set("T1_E9", "{}").unwrap();
        assert_eq!(cache.get("T1_E9").unwrap().as_deref(), Some("{}"));

        cache.remove("T1_E9").unwrap();
        assert!(cache.get("T1_E9").unwrap().is_none());
    }

    #[test]
    fn remove_missing_key_is_ok() {
        let cache = MemoryFastCache::new();
        assert!(cache.remove("nope").is_ok());
    }

    #[test]
    fn contains_key_and_len_reflect_state() {
        let cache = MemoryFastCache::new();
        assert!(cache.is_empty());
        assert!(!cache.contains_key("a"));

        cache.set("a", "1").unwrap();
        cache.set("b", "2").unwrap();
        assert!(cache.contains_key("a"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn used_bytes_counts_keys_and_values() {
        let cache = MemoryFastCache::new();
        cache.set("ab", "cde").unwrap();
        cache.set("f", "g").unwrap();
        assert_eq!(cache.used_bytes(), 7);
    }

    #[test]
    fn quota_rejects_oversized_values() {
        let cache = MemoryFastCache::with_capacity(Some(10));
        cache.set("k", "12345").unwrap();

        let err = cache.set("other", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert!(!cache.contains_key("other"));
    }

    #[test]
    fn quota_allows_shrinking_replacement() {
        let cache = MemoryFastCache::with_capacity(Some(10));
        cache.set("k", "123456789").unwrap();
        cache.set("k", "1").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn unbounded_cache_has_no_capacity() {
        let cache = MemoryFastCache::with_capacity(None);
        assert!(cache.capacity().is_none());
        cache.set("k", &"x".repeat(10_000)).unwrap();
    }
}
