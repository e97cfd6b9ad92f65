//! Unified read/write contract over the fast cache and the durable store.
//!
//! Writes go to both tiers: the fast cache synchronously, then the durable
//! store. A write succeeds if either tier confirms it; [`WriteReport`] says
//! which. Reads prefer the fast cache and fall back to the durable store.
//!
//! The durable connection is opened lazily, once, under an async guard, and
//! shared by every engine using this coordinator. If opening fails because
//! the store was created under another schema version, the store is
//! destroyed and opened again, once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gradesave_core::{ClockSource, DraftBuffer, PersistedRecord, SessionKey, SystemClock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metrics;
use crate::storage::{DurableConnection, DurableStore, FastCache, StorageError};

/// Outcome of a [`StorageCoordinator::write`] where at least one tier
/// confirmed the record.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    /// Timestamp stamped into the written record.
    pub timestamp: DateTime<Utc>,
    pub fast_cache_ok: bool,
    pub durable_ok: bool,
    pub fast_cache_error: Option<StorageError>,
    pub durable_error: Option<StorageError>,
}

impl WriteReport {
    /// Both tiers confirmed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fast_cache_ok && self.durable_ok
    }

    /// Only the fast cache confirmed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.fast_cache_ok && !self.durable_ok
    }

    /// The durable tier failed with a schema conflict. The next durable
    /// operation re-opens the store and recovers, so there is nothing to
    /// retry.
    #[must_use]
    pub fn durable_schema_conflict(&self) -> bool {
        self.durable_error
            .as_ref()
            .is_some_and(StorageError::is_schema_conflict)
    }
}

/// Owns both storage tiers and the memoized durable connection.
///
/// Construct once, wrap in an `Arc` and share between engines. Engines with
/// different session keys never see each other's records.
pub struct StorageCoordinator {
    fast: Arc<dyn FastCache>,
    durable: Arc<dyn DurableStore>,
    connection: Mutex<Option<Arc<dyn DurableConnection>>>,
    clock: Arc<dyn ClockSource>,
}

impl StorageCoordinator {
    /// Creates a coordinator stamping records with the system clock.
    #[must_use]
    pub fn new(fast: Arc<dyn FastCache>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            fast,
            durable,
            connection: Mutex::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp written records.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the durable backend, for logs.
    #[must_use]
    pub fn durable_store_name(&self) -> &'static str {
        self.durable.name()
    }

    /// Writes a snapshot of `payload` to both tiers.
    ///
    /// A fast-cache failure is logged and does not stop the durable write.
    /// When the durable write then succeeds, the previous fast-cache entry
    /// for the key is removed so reads fall through to the durable copy.
    ///
    /// # Errors
    ///
    /// Returns the durable tier's error when neither tier confirmed the
    /// write.
    pub async fn write(
        &self,
        key: &SessionKey,
        payload: &DraftBuffer,
    ) -> Result<WriteReport, StorageError> {
        let timestamp = self.clock.now();
        let record = PersistedRecord::new(key.record_id(), payload.clone(), timestamp);

        let fast_cache_error = self.put_fast_cache(&record).err();
        if let Some(err) = &fast_cache_error {
            warn!(key = %record.id, error = %err, "fast cache write failed");
        }

        let durable_error = self.put_durable(&record).await.err();
        if let Some(err) = &durable_error {
            warn!(
                key = %record.id,
                store = self.durable.name(),
                error = %err,
                "durable write failed"
            );
        }

        if fast_cache_error.is_some() && durable_error.is_none() {
            // Reads prefer the fast cache, so an older copy left there would
            // shadow the record just confirmed by the durable store.
            if let Err(err) = self.fast.remove(&record.id) {
                warn!(key = %record.id, error = %err, "stale fast cache entry not removed");
            }
        }

        match (fast_cache_error, durable_error) {
            (Some(_), Some(durable)) => Err(durable),
            (fast_cache_error, durable_error) => Ok(WriteReport {
                timestamp,
                fast_cache_ok: fast_cache_error.is_none(),
                durable_ok: durable_error.is_none(),
                fast_cache_error,
                durable_error,
            }),
        }
    }

    /// Writes a snapshot of `payload` to the fast cache only, without
    /// suspending. Used when the host is tearing down.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if serialization or the cache write fails.
    pub fn write_fast_cache(
        &self,
        key: &SessionKey,
        payload: &DraftBuffer,
    ) -> Result<DateTime<Utc>, StorageError> {
        let timestamp = self.clock.now();
        let record = PersistedRecord::new(key.record_id(), payload.clone(), timestamp);
        self.put_fast_cache(&record)?;
        Ok(timestamp)
    }

    /// Writes a snapshot of `payload` to the durable store only.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be opened or written.
    pub async fn write_durable(
        &self,
        key: &SessionKey,
        payload: &DraftBuffer,
    ) -> Result<DateTime<Utc>, StorageError> {
        let timestamp = self.clock.now();
        let record = PersistedRecord::new(key.record_id(), payload.clone(), timestamp);
        self.put_durable(&record).await?;
        Ok(timestamp)
    }

    /// Loads the record for `key`: the fast cache first, then the durable
    /// store. Unreadable fast-cache entries are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the fast cache had nothing usable and the
    /// durable store could not be read.
    pub async fn read(&self, key: &SessionKey) -> Result<Option<PersistedRecord>, StorageError> {
        let id = key.record_id();
        match self.fast.get(&id) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedRecord>(&raw) {
                Ok(record) => {
                    warn_on_foreign_schema(&record);
                    debug!(key = %id, "recovered draft from fast cache");
                    return Ok(Some(record));
                }
                Err(err) => warn!(key = %id, error = %err, "skipping corrupt fast cache entry"),
            },
            Ok(None) => {}
            Err(err) => warn!(key = %id, error = %err, "fast cache read failed"),
        }

        let conn = self.connection().await?;
        let record = match conn.get(&id).await {
            Ok(record) => record,
            Err(err) => {
                self.on_durable_error(&err).await;
                return Err(err);
            }
        };
        if let Some(record) = &record {
            warn_on_foreign_schema(record);
            debug!(key = %id, "recovered draft from durable store");
        }
        Ok(record)
    }

    /// Deletes the record for `key` from both tiers. Failures are logged.
    pub async fn remove(&self, key: &SessionKey) {
        let id = key.record_id();
        if let Err(err) = self.fast.remove(&id) {
            warn!(key = %id, error = %err, "fast cache remove failed");
        }

        let conn = match self.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(key = %id, error = %err, "durable store unavailable for remove");
                return;
            }
        };
        if let Err(err) = conn.delete(&id).await {
            self.on_durable_error(&err).await;
            warn!(key = %id, error = %err, "durable remove failed");
        }
    }

    fn put_fast_cache(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let raw = serde_json::to_string(record)?;
        self.fast.set(&record.id, &raw)
    }

    async fn put_durable(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let conn = self.connection().await?;
        if let Err(err) = conn.put(record).await {
            self.on_durable_error(&err).await;
            return Err(err);
        }
        Ok(())
    }

    /// Returns the memoized connection, opening it on first use.
    ///
    /// The guard is held across the open, so concurrent callers wait for
    /// the first open instead of racing their own.
    async fn connection(&self) -> Result<Arc<dyn DurableConnection>, StorageError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(Arc::clone(conn));
        }
        let conn = self.open_with_recovery().await?;
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn open_with_recovery(&self) -> Result<Arc<dyn DurableConnection>, StorageError> {
        match self.durable.open().await {
            Ok(conn) => Ok(conn),
            Err(err) if err.is_schema_conflict() => {
                warn!(
                    store = self.durable.name(),
                    error = %err,
                    "durable store schema conflict, recreating store"
                );
                metrics::record_schema_recovery();
                self.durable.destroy().await?;
                self.durable.open().await
            }
            Err(err) => Err(err),
        }
    }

    /// Drops the memoized connection after a schema conflict so the next
    /// caller re-opens, and recovers, the store.
    async fn on_durable_error(&self, err: &StorageError) {
        if err.is_schema_conflict() {
            self.connection.lock().await.take();
        }
    }
}

fn warn_on_foreign_schema(record: &PersistedRecord) {
    if !record.has_current_schema() {
        warn!(
            key = %record.id,
            schema = %record.schema_version,
            "loaded draft written under another schema tag"
        );
    }
}
