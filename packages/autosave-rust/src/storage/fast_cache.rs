//! Fast cache trait.
//!
//! Defines [`FastCache`], the synchronous first-tier store. It holds one
//! serialized string per key, survives host reloads where the
//! implementation allows it, and offers no transactional guarantees.

use super::error::StorageError;

/// Synchronous, capacity-bounded key-value store of serialized strings.
///
/// Every operation completes without suspending, which is what makes the
/// fast cache usable from the teardown flush where async work may never
/// finish.
///
/// Used as `Arc<dyn FastCache>`.
pub trait FastCache: Send + Sync + 'static {
    /// Retrieve the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or replace the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] when the value does not fit,
    /// or another [`StorageError`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Check if a key exists without returning the value.
    fn contains_key(&self, key: &str) -> bool;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Whether the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes currently held.
    fn used_bytes(&self) -> u64;
}

/// Checks that replacing `old_len` bytes with `new_len` bytes keeps `used`
/// within `capacity`.
pub(crate) fn check_quota(
    capacity: Option<u64>,
    used: u64,
    old_len: u64,
    new_len: u64,
) -> Result<(), StorageError> {
    let Some(capacity) = capacity else {
        return Ok(());
    };
    let available = capacity.saturating_sub(used.saturating_sub(old_len));
    if new_len > available {
        return Err(StorageError::QuotaExceeded {
            needed: new_len,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_cache_accepts_anything() {
        assert!(check_quota(None, u64::MAX, 0, u64::MAX).is_ok());
    }

    #[test]
    fn replacement_frees_the_old_value() {
        // 90 of 100 bytes used, 40 of them by the key being replaced.
        assert!(check_quota(Some(100), 90, 40, 50).is_ok());
        assert_eq!(
            check_quota(Some(100), 90, 40, 51),
            Err(StorageError::QuotaExceeded {
                needed: 51,
                available: 50
            })
        );
    }
}
