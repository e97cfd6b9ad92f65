//! Error type shared by every storage backend.

/// Failure reported by a fast cache or durable store.
///
/// `Clone` so a degraded write can carry the durable error in its
/// [`WriteReport`](crate::coordinator::WriteReport) while the engine keeps
/// a copy for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backend is busy, locked or temporarily unreachable.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    /// The durable store was created under a different schema version.
    #[error("schema mismatch: store has {found}, expected {expected}")]
    SchemaMismatch { found: String, expected: String },
    /// The fast cache has no room for the value.
    #[error("quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error is a schema/version conflict that the coordinator
    /// recovers from by recreating the durable store.
    #[must_use]
    pub fn is_schema_conflict(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }

    /// Wraps any displayable backend error.
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
