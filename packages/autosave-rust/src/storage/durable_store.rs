//! Durable store traits.
//!
//! Defines [`DurableStore`], the asynchronous, transactional, schema-versioned
//! second tier, and [`DurableConnection`], an open handle to it. The
//! [`StorageCoordinator`](crate::coordinator::StorageCoordinator) is the only
//! owner of a connection; engines never see one.

use std::sync::Arc;

use async_trait::async_trait;
use gradesave_core::PersistedRecord;

use super::error::StorageError;

/// Factory for connections to a schema-versioned object store.
///
/// `open` creates the schema on first use and fails with
/// [`StorageError::SchemaMismatch`] when an existing store was created under
/// another schema version. `destroy` deletes the whole store so a following
/// `open` starts from scratch.
///
/// Used as `Arc<dyn DurableStore>`.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Open a connection, creating the schema if the store is new.
    async fn open(&self) -> Result<Arc<dyn DurableConnection>, StorageError>;

    /// Delete the store, including every record and the schema marker.
    async fn destroy(&self) -> Result<(), StorageError>;
}

/// An open connection to a [`DurableStore`].
///
/// Each operation runs in its own transaction, so a record is either fully
/// written or not written at all.
#[async_trait]
pub trait DurableConnection: Send + Sync {
    /// Insert or replace the record keyed by `record.id`.
    async fn put(&self, record: &PersistedRecord) -> Result<(), StorageError>;

    /// Load the record with the given id.
    async fn get(&self, id: &str) -> Result<Option<PersistedRecord>, StorageError>;

    /// Delete the record with the given id. Deleting a missing id is not an
    /// error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
