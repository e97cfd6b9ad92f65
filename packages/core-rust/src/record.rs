//! The unit written to a storage backend.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::DraftBuffer;

/// Schema tag stamped into every persisted record.
///
/// Informational only: readers accept records carrying any tag.
pub const SCHEMA_VERSION: &str = "1.0";

/// A snapshot of a [`DraftBuffer`] as stored by a backend.
///
/// `id` is the session's composite key, so each backend holds at most one
/// record per (teacher, exam) pair. `timestamp` is an RFC 3339 string with
/// millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    /// Composite session id, `"<teacherId>_<examId>"`.
    pub id: String,
    /// Complete buffer snapshot.
    pub payload: DraftBuffer,
    /// Write time, RFC 3339.
    pub timestamp: String,
    /// Schema tag, see [`SCHEMA_VERSION`].
    pub schema_version: String,
}

impl PersistedRecord {
    /// Builds a record stamped with `at` and the current [`SCHEMA_VERSION`].
    #[must_use]
    pub fn new(id: impl Into<String>, payload: DraftBuffer, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    /// Parses [`timestamp`](Self::timestamp), or `None` if it is not valid
    /// RFC 3339.
    #[must_use]
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Whether this record was written under the current schema tag.
    #[must_use]
    pub fn has_current_schema(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}
