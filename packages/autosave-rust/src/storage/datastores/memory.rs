//! In-process [`DurableStore`] implementation.
//!
//! [`MemoryDurableStore`] keeps records in a shared map guarded by a
//! schema marker, mirroring how a real object store behaves across
//! version bumps. Clones share the same underlying store, so two
//! coordinators built from clones see the same data. Useful for tests and
//! for ephemeral sessions that do not need on-disk durability.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gradesave_core::PersistedRecord;
use parking_lot::Mutex;

use crate::storage::durable_store::{DurableConnection, DurableStore};
use crate::storage::error::StorageError;

#[derive(Debug, Default)]
struct MemoryDb {
    schema_version: Option<u32>,
    records: HashMap<String, PersistedRecord>,
}

/// Schema-versioned in-memory durable store.
#[derive(Debug, Clone)]
pub struct MemoryDurableStore {
    schema_version: u32,
    db: Arc<Mutex<MemoryDb>>,
}

impl MemoryDurableStore {
    /// Creates an empty store that opens under `schema_version`.
    #[must_use]
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            db: Arc::new(Mutex::new(MemoryDb::default())),
        }
    }

    /// Returns a handle to the same data that opens under a different
    /// schema version, as a newer build of the host would.
    #[must_use]
    pub fn with_schema_version(&self, schema_version: u32) -> Self {
        Self {
            schema_version,
            db: Arc::clone(&self.db),
        }
    }

    /// Schema version recorded in the store, if it was ever opened.
    #[must_use]
    pub fn stored_schema_version(&self) -> Option<u32> {
        self.db.lock().schema_version
    }

    /// Record with the given id, bypassing any connection.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<PersistedRecord> {
        self.db.lock().records.get(id).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.db.lock().records.len()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> Result<Arc<dyn DurableConnection>, StorageError> {
        let mut db = self.db.lock();
        match db.schema_version {
            Some(found) if found != self.schema_version => {
                return Err(StorageError::SchemaMismatch {
                    found: found.to_string(),
                    expected: self.schema_version.to_string(),
                });
            }
            Some(_) => {}
            None => db.schema_version = Some(self.schema_version),
        }
        Ok(Arc::new(MemoryConnection {
            schema_version: self.schema_version,
            db: Arc::clone(&self.db),
        }))
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        let mut db = self.db.lock();
        db.schema_version = None;
        db.records.clear();
        Ok(())
    }
}

/// Connection to a [`MemoryDurableStore`], pinned to the schema it was
/// opened under.
struct MemoryConnection {
    schema_version: u32,
    db: Arc<Mutex<MemoryDb>>,
}

impl MemoryConnection {
    /// Fails if the store was destroyed or recreated under another schema
    /// since this connection was opened.
    fn check_schema(&self, db: &MemoryDb) -> Result<(), StorageError> {
        match db.schema_version {
            Some(v) if v == self.schema_version => Ok(()),
            Some(v) => Err(StorageError::SchemaMismatch {
                found: v.to_string(),
                expected: self.schema_version.to_string(),
            }),
            None => Err(StorageError::Unavailable("store was deleted".to_string())),
        }
    }
}

#[async_trait]
impl DurableConnection for MemoryConnection {
    async fn put(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let mut db = self.db.lock();
        self.check_schema(&db)?;
        db.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PersistedRecord>, StorageError> {
        let db = self.db.lock();
        self.check_schema(&db)?;
        Ok(db.records.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut db = self.db.lock();
        self.check_schema(&db)?;
        db.records.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gradesave_core::{DraftBuffer, GradePatch};

    use super::*;

    fn record(id: &str) -> PersistedRecord {
        let mut payload = DraftBuffer::new();
        payload.merge_record("S1", &GradePatch::new().component_a(12));
        PersistedRecord::new(id, payload, Utc::now())
    }

    #[tokio::test]
    async fn open_stamps_schema_version() {
        let store = MemoryDurableStore::new(1);
        assert!(store.stored_schema_version().is_none());

        store.open().await.unwrap();
        assert_eq!(store.stored_schema_version(), Some(1));
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryDurableStore::new(1);
        let conn = store.open().await.unwrap();

        let written = record("T1_E9");
        conn.put(&written).await.unwrap();
        assert_eq!(conn.get("T1_E9").await.unwrap(), Some(written));
        assert_eq!(store.record_count(), 1);

        conn.delete("T1_E9").await.unwrap();
        assert!(conn.get("T1_E9").await.unwrap().is_none());
        assert!(conn.delete("T1_E9").await.is_ok());
    }

    #[tokio::test]
    async fn open_under_other_version_is_a_schema_conflict() {
        let old = MemoryDurableStore::new(1);
        old.open().await.unwrap();

        let upgraded = old.with_schema_version(2);
        let err = upgraded.open().await.err().unwrap();
        assert!(err.is_schema_conflict());
    }

    #[tokio::test]
    async fn destroy_allows_reopen_under_new_version() {
        let old = MemoryDurableStore::new(1);
        old.open().await.unwrap().put(&record("T1_E9")).await.unwrap();

        let upgraded = old.with_schema_version(2);
        upgraded.destroy().await.unwrap();
        upgraded.open().await.unwrap();

        assert_eq!(upgraded.stored_schema_version(), Some(2));
        assert_eq!(upgraded.record_count(), 0);
    }

    #[tokio::test]
    async fn stale_connection_rejects_writes() {
        let old = MemoryDurableStore::new(1);
        let stale = old.open().await.unwrap();

        let upgraded = old.with_schema_version(2);
        upgraded.destroy().await.unwrap();
        upgraded.open().await.unwrap();

        let err = stale.put(&record("T1_E9")).await.unwrap_err();
        assert!(err.is_schema_conflict());
    }
}
