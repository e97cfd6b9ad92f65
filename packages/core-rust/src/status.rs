//! Save status reported by the autosave engine.
//!
//! [`SaveStatus`] is derived state: the engine is its only writer and it is
//! never persisted. Hosts render it as a save indicator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observable save state of one grading session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    /// A write (or a retry of one) is in progress.
    pub is_saving: bool,
    /// Time of the last confirmed write, or of the recovered record.
    pub last_saved: Option<DateTime<Utc>>,
    /// Number of confirmed writes in this session.
    pub save_count: u64,
    /// Last surfaced failure, cleared by the next successful write.
    pub error: Option<String>,
    /// Some mutation is not yet confirmed by any backend.
    pub pending_changes: bool,
}

impl SaveStatus {
    /// Whether the host should warn before navigating away.
    #[must_use]
    pub fn has_unsaved_work(&self) -> bool {
        self.pending_changes || self.error.is_some()
    }
}

/// Coarse state of the engine's save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SavePhase {
    /// Nothing scheduled. Also the phase after the retry budget runs
    /// out, with the data held in memory only.
    Idle,
    /// A debounce timer is armed.
    PendingSave,
    /// A write is in flight.
    Saving,
    /// A failed write is waiting for its next attempt.
    Retrying,
    /// The last write was confirmed.
    Saved,
}
