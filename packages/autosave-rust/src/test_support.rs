//! Fault-injecting backend doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gradesave_core::PersistedRecord;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::storage::datastores::MemoryDurableStore;
use crate::storage::engines::MemoryFastCache;
use crate::storage::{DurableConnection, DurableStore, FastCache, StorageError};

pub(crate) fn unavailable() -> StorageError {
    StorageError::Unavailable("injected failure".to_string())
}

/// Memory fast cache that can be switched into failing every write.
#[derive(Debug, Default)]
pub(crate) struct FlakyFastCache {
    inner: MemoryFastCache,
    failing: AtomicBool,
    sets: AtomicUsize,
}

impl FlakyFastCache {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let cache = Self::new();
        cache.set_failing(true);
        cache
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `set` calls, successful or not.
    pub(crate) fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, id: &str) -> Option<PersistedRecord> {
        let raw = self.inner.get(id).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }
}

impl FastCache for FlakyFastCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                needed: value.len() as u64,
                available: 0,
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn used_bytes(&self) -> u64 {
        self.inner.used_bytes()
    }
}

#[derive(Default)]
struct Script {
    queued_failures: Mutex<VecDeque<StorageError>>,
    always_fail: Mutex<Option<StorageError>>,
    put_delay: Mutex<Option<Duration>>,
    put_log: Mutex<Vec<Instant>>,
    opens: AtomicUsize,
}

impl Script {
    fn next_failure(&self) -> Option<StorageError> {
        if let Some(err) = self.queued_failures.lock().pop_front() {
            return Some(err);
        }
        self.always_fail.lock().clone()
    }
}

/// Memory durable store whose writes can be scripted to fail or stall.
///
/// Every `put` is logged with the (tokio) instant it started, which is what
/// the timing tests assert against.
#[derive(Clone)]
pub(crate) struct ScriptedDurableStore {
    inner: MemoryDurableStore,
    script: Arc<Script>,
}

impl ScriptedDurableStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryDurableStore::new(1),
            script: Arc::default(),
        })
    }

    /// Fails the next `n` puts with `err`.
    pub(crate) fn fail_next_puts(&self, n: usize, err: &StorageError) {
        let mut queued = self.script.queued_failures.lock();
        queued.extend((0..n).map(|_| err.clone()));
    }

    /// Fails every put with `err` until [`heal`](Self::heal).
    pub(crate) fn fail_all_puts(&self, err: StorageError) {
        *self.script.always_fail.lock() = Some(err);
    }

    pub(crate) fn heal(&self) {
        self.script.queued_failures.lock().clear();
        *self.script.always_fail.lock() = None;
    }

    /// Makes every put take `delay` before it completes.
    pub(crate) fn stall_puts(&self, delay: Duration) {
        *self.script.put_delay.lock() = Some(delay);
    }

    pub(crate) fn put_times(&self) -> Vec<Instant> {
        self.script.put_log.lock().clone()
    }

    pub(crate) fn put_count(&self) -> usize {
        self.script.put_log.lock().len()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, id: &str) -> Option<PersistedRecord> {
        self.inner.record(id)
    }
}

#[async_trait]
impl DurableStore for ScriptedDurableStore {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self) -> Result<Arc<dyn DurableConnection>, StorageError> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open().await?;
        Ok(Arc::new(ScriptedConnection {
            inner,
            script: Arc::clone(&self.script),
        }))
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        self.inner.destroy().await
    }
}

struct ScriptedConnection {
    inner: Arc<dyn DurableConnection>,
    script: Arc<Script>,
}

#[async_trait]
impl DurableConnection for ScriptedConnection {
    async fn put(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        self.script.put_log.lock().push(Instant::now());
        let delay = *self.script.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.script.next_failure() {
            return Err(err);
        }
        self.inner.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<PersistedRecord>, StorageError> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.inner.delete(id).await
    }
}
