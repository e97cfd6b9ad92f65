//! [`DurableStore`] backed by a redb database file.
//!
//! Records are encoded with `MsgPack` (`rmp-serde`, named fields) into a
//! `drafts` table keyed by record id. A `meta` table holds the schema
//! version the file was created under; opening a file stamped with another
//! version fails with [`StorageError::SchemaMismatch`], as does a file
//! written by an older redb on-disk format.
//!
//! redb is synchronous, so every transaction runs on the blocking pool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gradesave_core::PersistedRecord;
use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableError};

use crate::storage::durable_store::{DurableConnection, DurableStore};
use crate::storage::error::StorageError;

/// Schema version written by this build.
pub const DURABLE_SCHEMA_VERSION: u32 = 1;

const META_TABLE: TableDefinition<&str, u32> = TableDefinition::new("meta");
const DRAFTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drafts");
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Durable store living in a single redb file.
#[derive(Debug, Clone)]
pub struct RedbDurableStore {
    path: PathBuf,
    schema_version: u32,
}

impl RedbDurableStore {
    /// Store at `path` using [`DURABLE_SCHEMA_VERSION`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema_version: DURABLE_SCHEMA_VERSION,
        }
    }

    /// Overrides the schema version this store opens under.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs a redb transaction on the blocking pool.
async fn run_blocking<T, F>(task: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StorageError::Backend(format!("blocking task failed: {err}")))?
}

fn map_database_error(err: DatabaseError) -> StorageError {
    match err {
        DatabaseError::DatabaseAlreadyOpen => {
            StorageError::Unavailable("database is locked by another handle".to_string())
        }
        DatabaseError::UpgradeRequired(format) => StorageError::SchemaMismatch {
            found: format!("redb file format {format}"),
            expected: "current redb file format".to_string(),
        },
        other => StorageError::backend(other),
    }
}

/// Opens or creates the database and reconciles its schema marker.
fn open_database(path: &Path, expected: u32) -> Result<Database, StorageError> {
    let db = Database::create(path).map_err(map_database_error)?;
    let txn = db.begin_write().map_err(StorageError::backend)?;
    {
        let mut meta = txn.open_table(META_TABLE).map_err(StorageError::backend)?;
        let found = meta
            .get(SCHEMA_VERSION_KEY)
            .map_err(StorageError::backend)?
            .map(|guard| guard.value());
        match found {
            Some(found) if found != expected => {
                return Err(StorageError::SchemaMismatch {
                    found: found.to_string(),
                    expected: expected.to_string(),
                });
            }
            Some(_) => {}
            None => {
                meta.insert(SCHEMA_VERSION_KEY, expected)
                    .map_err(StorageError::backend)?;
            }
        }
        txn.open_table(DRAFTS_TABLE).map_err(StorageError::backend)?;
    }
    txn.commit().map_err(StorageError::backend)?;
    Ok(db)
}

#[async_trait]
impl DurableStore for RedbDurableStore {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn open(&self) -> Result<Arc<dyn DurableConnection>, StorageError> {
        let path = self.path.clone();
        let expected = self.schema_version;
        let db = run_blocking(move || open_database(&path, expected)).await?;
        tracing::debug!(path = %self.path.display(), schema = expected, "opened redb durable store");
        Ok(Arc::new(RedbConnection { db: Arc::new(db) }))
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        let path = self.path.clone();
        run_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        })
        .await
    }
}

/// Open handle to a redb durable store.
struct RedbConnection {
    db: Arc<Database>,
}

#[async_trait]
impl DurableConnection for RedbConnection {
    async fn put(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let bytes = rmp_serde::to_vec_named(record)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let id = record.id.clone();
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let txn = db.begin_write().map_err(StorageError::backend)?;
            {
                let mut table = txn.open_table(DRAFTS_TABLE).map_err(StorageError::backend)?;
                table
                    .insert(id.as_str(), bytes.as_slice())
                    .map_err(StorageError::backend)?;
            }
            txn.commit().map_err(StorageError::backend)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<PersistedRecord>, StorageError> {
        let id = id.to_string();
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let txn = db.begin_read().map_err(StorageError::backend)?;
            let table = match txn.open_table(DRAFTS_TABLE) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(err) => return Err(StorageError::backend(err)),
            };
            let Some(guard) = table.get(id.as_str()).map_err(StorageError::backend)? else {
                return Ok(None);
            };
            let record: PersistedRecord = rmp_serde::from_slice(guard.value())
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
            Ok(Some(record))
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let txn = db.begin_write().map_err(StorageError::backend)?;
            {
                let mut table = txn.open_table(DRAFTS_TABLE).map_err(StorageError::backend)?;
                table.remove(id.as_str()).map_err(StorageError::backend)?;
            }
            txn.commit().map_err(StorageError::backend)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gradesave_core::{DraftBuffer, GradePatch};

    use super::*;

    fn record(id: &str) -> PersistedRecord {
        let mut payload = DraftBuffer::new();
        payload.merge_record("S100", &GradePatch::new().component_a(15).notes("absent in part 2"));
        PersistedRecord::new(id, payload, Utc::now())
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbDurableStore::new(tmp.path().join("drafts.redb"));
        let conn = store.open().await.unwrap();

        let written = record("T1_E9");
        conn.put(&written).await.unwrap();
        assert_eq!(conn.get("T1_E9").await.unwrap(), Some(written));

        conn.delete("T1_E9").await.unwrap();
        assert!(conn.get("T1_E9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_record_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbDurableStore::new(tmp.path().join("drafts.redb"));
        let conn = store.open().await.unwrap();
        assert!(conn.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("drafts.redb");
        let written = record("T1_E9");
        {
            let conn = RedbDurableStore::new(&path).open().await.unwrap();
            conn.put(&written).await.unwrap();
        }

        let conn = RedbDurableStore::new(&path).open().await.unwrap();
        assert_eq!(conn.get("T1_E9").await.unwrap(), Some(written));
    }

    #[tokio::test]
    async fn version_bump_is_a_schema_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("drafts.redb");
        drop(RedbDurableStore::new(&path).open().await.unwrap());

        let upgraded = RedbDurableStore::new(&path).with_schema_version(DURABLE_SCHEMA_VERSION + 1);
        let err = upgraded.open().await.err().unwrap();
        assert!(err.is_schema_conflict(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn destroy_then_open_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("drafts.redb");
        {
            let conn = RedbDurableStore::new(&path).open().await.unwrap();
            conn.put(&record("T1_E9")).await.unwrap();
        }

        let upgraded = RedbDurableStore::new(&path).with_schema_version(7);
        upgraded.destroy().await.unwrap();
        assert!(!path.exists());

        let conn = upgraded.open().await.unwrap();
        assert!(conn.get("T1_E9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_missing_file_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbDurableStore::new(tmp.path().join("never-created.redb"));
        assert!(store.destroy().await.is_ok());
    }

    #[tokio::test]
    async fn second_handle_on_open_file_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("drafts.redb");
        let _held = RedbDurableStore::new(&path).open().await.unwrap();

        let err = RedbDurableStore::new(&path).open().await.err().unwrap();
        assert!(matches!(err, StorageError::Unavailable(_)), "unexpected error: {err}");
    }
}
