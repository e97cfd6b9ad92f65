//! The autosave engine.
//!
//! An [`AutoSaveEngine`] owns the in-progress [`DraftBuffer`] of one
//! grading session and keeps it persisted without explicit saves:
//!
//! 1. Every mutation marks the buffer dirty and (re)arms a debounce timer.
//! 2. When the timer fires, a snapshot of the buffer is written through the
//!    [`StorageCoordinator`].
//! 3. If both tiers fail, the write is retried with exponential backoff
//!    until the attempt budget runs out. If only the durable tier fails,
//!    the save counts and the durable write is re-driven in the background.
//!
//! Progress is published as a [`SaveStatus`] on a `watch` channel; no
//! storage error is returned to callers.
//!
//! Writes are serialized by an async save gate. Buffer and bookkeeping
//! live behind a `parking_lot` mutex that is never held across an await.
//! A clear bumps an epoch so results of writes started earlier are
//! dropped.

use std::sync::{Arc, Weak};

use gradesave_core::{
    AutoSaveConfig, ConfigError, DraftBuffer, GradePatch, GradeRecord, SavePhase, SaveStatus,
    SessionKey,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::coordinator::{StorageCoordinator, WriteReport};
use crate::lifecycle::{HostLifecycle, HostState};
use crate::metrics::{self, FlushTrigger, RetryKind, WriteOutcome};
use crate::scheduler::ScheduledTask;
use crate::storage::StorageError;

/// What started a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveCause {
    Debounce,
    Flush(FlushTrigger),
    Retry,
}

struct EngineState {
    buffer: DraftBuffer,
    /// Bumped by every mutation.
    revision: u64,
    /// Highest revision confirmed by at least one tier.
    saved_revision: u64,
    /// Bumped by clear; writes started under an older epoch are ignored.
    epoch: u64,
    /// Failed attempts of the current save cycle.
    failed_attempts: u32,
    phase: SavePhase,
    debounce: ScheduledTask,
    retry: ScheduledTask,
    durable_retry: ScheduledTask,
    last_write: Option<WriteReport>,
    lifecycle: Option<JoinHandle<()>>,
}

impl EngineState {
    fn new(buffer: DraftBuffer) -> Self {
        Self {
            buffer,
            revision: 0,
            saved_revision: 0,
            epoch: 0,
            failed_attempts: 0,
            phase: SavePhase::Idle,
            debounce: ScheduledTask::new(),
            retry: ScheduledTask::new(),
            durable_retry: ScheduledTask::new(),
            last_write: None,
            lifecycle: None,
        }
    }

    fn has_pending(&self) -> bool {
        self.revision != self.saved_revision
    }

    fn cancel_timers(&mut self) {
        self.debounce.cancel();
        self.retry.cancel();
        self.durable_retry.cancel();
    }
}

struct EngineInner {
    key: SessionKey,
    config: AutoSaveConfig,
    coordinator: Arc<StorageCoordinator>,
    runtime: Handle,
    state: Mutex<EngineState>,
    status: watch::Sender<SaveStatus>,
    save_gate: tokio::sync::Mutex<()>,
}

/// Debounced, retried persistence of one grading session's drafts.
///
/// Dropping the engine writes any unsaved buffer to the fast cache and
/// cancels its timers.
pub struct AutoSaveEngine {
    inner: Arc<EngineInner>,
}

impl AutoSaveEngine {
    /// Creates an engine for `key` and loads any draft previously saved
    /// under it. Must be called from within a tokio runtime.
    ///
    /// A failed recovery is logged and the engine starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    pub async fn start(
        key: SessionKey,
        config: AutoSaveConfig,
        coordinator: Arc<StorageCoordinator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (status, _) = watch::channel(SaveStatus::default());
        let engine = Self {
            inner: Arc::new(EngineInner {
                key,
                config,
                coordinator,
                runtime: Handle::current(),
                state: Mutex::new(EngineState::new(DraftBuffer::new())),
                status,
                save_gate: tokio::sync::Mutex::new(()),
            }),
        };
        engine.inner.recover().await;
        Ok(engine)
    }

    /// Session this engine persists.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AutoSaveConfig {
        &self.inner.config
    }

    /// Snapshot of the whole buffer.
    #[must_use]
    pub fn data(&self) -> DraftBuffer {
        self.inner.state.lock().buffer.clone()
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn record(&self, key: &str) -> Option<GradeRecord> {
        self.inner.state.lock().buffer.get(key).cloned()
    }

    /// Current save status.
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified on every status change. Intermediate states may
    /// be coalesced; the latest state is always observed.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// Current phase of the save cycle.
    #[must_use]
    pub fn phase(&self) -> SavePhase {
        self.inner.state.lock().phase
    }

    /// Report of the last confirmed write.
    #[must_use]
    pub fn last_write(&self) -> Option<WriteReport> {
        self.inner.state.lock().last_write.clone()
    }

    /// Merges `patch` into the record for `key`, seeding a blank record if
    /// the key is new.
    pub fn update_record(&self, key: &str, patch: &GradePatch) {
        self.mutate(|buffer| buffer.merge_record(key, patch));
    }

    /// Replaces the buffer with `updater(current)`.
    ///
    /// `updater` runs under the engine's lock and must not call back into
    /// the engine.
    pub fn update_data(&self, updater: impl FnOnce(&DraftBuffer) -> DraftBuffer) {
        self.mutate(|buffer| *buffer = updater(buffer));
    }

    /// Merges `other` into the buffer; each of its keys replaces the
    /// existing record.
    pub fn merge_data(&self, other: DraftBuffer) {
        self.mutate(|buffer| buffer.merge(other));
    }

    /// Writes now if anything is pending, skipping the debounce.
    pub async fn force_save(&self) {
        self.inner.flush(FlushTrigger::Forced).await;
    }

    /// Forgets the session: cancels pending work, resets buffer and status,
    /// then deletes the saved record from both tiers once any in-flight
    /// write has finished.
    pub async fn clear_saved_data(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.cancel_timers();
            state.epoch += 1;
            state.buffer = DraftBuffer::new();
            state.saved_revision = state.revision;
            state.failed_attempts = 0;
            state.phase = SavePhase::Idle;
            state.last_write = None;
            inner.status.send_replace(SaveStatus::default());
        }

        let _gate = inner.save_gate.lock().await;
        inner.coordinator.remove(&inner.key).await;
        info!(key = %inner.key, "cleared saved draft");
    }

    /// Writes pending changes now. Call when the host is hidden.
    pub async fn flush_on_hidden(&self) {
        self.inner.flush(FlushTrigger::Hidden).await;
    }

    /// Writes pending changes to the fast cache without suspending. Call
    /// when the host is closing and async work may never complete.
    pub fn flush_on_teardown(&self) {
        self.inner.flush_sync();
    }

    /// Flushes on the lifecycle's hidden and teardown transitions. Replaces
    /// any previously attached lifecycle.
    pub fn attach_lifecycle(&self, lifecycle: &HostLifecycle) {
        let mut rx = lifecycle.subscribe();
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let listener = self.inner.runtime.spawn(async move {
            while rx.changed().await.is_ok() {
                let host = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match host {
                    HostState::Hidden => inner.flush(FlushTrigger::Hidden).await,
                    HostState::TearingDown => {
                        inner.flush_sync();
                        break;
                    }
                    HostState::Visible => {}
                }
            }
        });
        if let Some(previous) = self.inner.state.lock().lifecycle.replace(listener) {
            previous.abort();
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut DraftBuffer)) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        apply(&mut state.buffer);
        state.revision += 1;
        if matches!(state.phase, SavePhase::Idle | SavePhase::Saved) {
            state.phase = SavePhase::PendingSave;
        }
        inner.arm_debounce(&mut state);
        inner.status.send_if_modified(|status| {
            if status.pending_changes {
                return false;
            }
            status.pending_changes = true;
            true
        });
    }
}

impl Drop for AutoSaveEngine {
    fn drop(&mut self) {
        self.inner.flush_sync();
        let mut state = self.inner.state.lock();
        state.cancel_timers();
        if let Some(listener) = state.lifecycle.take() {
            listener.abort();
        }
    }
}

impl EngineInner {
    async fn recover(&self) {
        match self.coordinator.read(&self.key).await {
            Ok(Some(record)) => {
                let last_saved = record.written_at();
                let records = record.payload.len();
                self.state.lock().buffer = record.payload;
                self.status.send_modify(|status| status.last_saved = last_saved);
                info!(
                    key = %self.key,
                    store = self.coordinator.durable_store_name(),
                    records,
                    "recovered saved draft"
                );
            }
            Ok(None) => debug!(key = %self.key, "no saved draft"),
            Err(err) => warn!(key = %self.key, error = %err, "draft recovery failed, starting empty"),
        }
    }

    fn arm_debounce(self: &Arc<Self>, state: &mut EngineState) {
        let weak = Arc::downgrade(self);
        let epoch = state.epoch;
        state
            .debounce
            .arm(&self.runtime, self.config.debounce(), async move {
                if let Some(inner) = weak.upgrade() {
                    inner.save(epoch, SaveCause::Debounce).await;
                }
            });
    }

    fn arm_retry(self: &Arc<Self>, state: &mut EngineState, failed: u32) {
        let weak = Arc::downgrade(self);
        let epoch = state.epoch;
        state
            .retry
            .arm(&self.runtime, self.config.retry_delay(failed), async move {
                if let Some(inner) = weak.upgrade() {
                    inner.save(epoch, SaveCause::Retry).await;
                }
            });
    }

    fn arm_durable_retry(self: &Arc<Self>, state: &mut EngineState, failed: u32) {
        let weak = Arc::downgrade(self);
        let epoch = state.epoch;
        state
            .durable_retry
            .arm(&self.runtime, self.config.retry_delay(failed), async move {
                if let Some(inner) = weak.upgrade() {
                    inner.retry_durable(epoch, failed).await;
                }
            });
    }

    async fn flush(self: &Arc<Self>, trigger: FlushTrigger) {
        let epoch = {
            let mut state = self.state.lock();
            if !state.has_pending() {
                return;
            }
            state.debounce.cancel();
            state.epoch
        };
        metrics::record_flush(trigger);
        debug!(key = %self.key, trigger = trigger.as_str(), "flushing draft");
        self.save(epoch, SaveCause::Flush(trigger)).await;
    }

    fn flush_sync(&self) {
        let buffer = {
            let state = self.state.lock();
            if !state.has_pending() {
                return;
            }
            state.buffer.clone()
        };
        metrics::record_flush(FlushTrigger::Teardown);
        match self.coordinator.write_fast_cache(&self.key, &buffer) {
            Ok(_) => debug!(key = %self.key, "teardown flush written to fast cache"),
            Err(err) => warn!(key = %self.key, error = %err, "teardown flush failed"),
        }
    }

    async fn save(self: &Arc<Self>, epoch: u64, cause: SaveCause) {
        let _gate = self.save_gate.lock().await;
        let (snapshot, revision) = {
            let mut state = self.state.lock();
            if state.epoch != epoch || !state.has_pending() {
                return;
            }
            if cause == SaveCause::Retry {
                metrics::record_retry(RetryKind::Write);
            } else {
                state.retry.cancel();
                state.failed_attempts = 0;
            }
            state.durable_retry.cancel();
            state.phase = SavePhase::Saving;
            self.status.send_if_modified(|status| {
                let changed = !status.is_saving;
                status.is_saving = true;
                changed
            });
            (state.buffer.clone(), state.revision)
        };

        debug!(key = %self.key, ?cause, revision, "saving draft");
        let result = self.coordinator.write(&self.key, &snapshot).await;
        self.finish_save(epoch, revision, result);
    }

    fn finish_save(
        self: &Arc<Self>,
        epoch: u64,
        revision: u64,
        result: Result<WriteReport, StorageError>,
    ) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!(key = %self.key, "discarding result of a write started before clear");
            return;
        }

        match result {
            Ok(report) => {
                state.saved_revision = state.saved_revision.max(revision);
                state.failed_attempts = 0;
                let pending = state.has_pending();
                state.phase = if pending {
                    SavePhase::PendingSave
                } else {
                    SavePhase::Saved
                };
                metrics::record_write(if report.is_complete() {
                    WriteOutcome::Complete
                } else {
                    WriteOutcome::Degraded
                });

                if report.durable_schema_conflict() {
                    info!(key = %self.key, "durable store schema changed, draft kept in fast cache");
                } else if report.is_degraded() && self.config.retry_attempts > 1 {
                    warn!(
                        key = %self.key,
                        retry_in = ?self.config.retry_delay(1),
                        "durable write failed, retrying in background"
                    );
                    self.arm_durable_retry(&mut state, 1);
                }

                self.status.send_modify(|status| {
                    status.is_saving = false;
                    status.last_saved = Some(report.timestamp);
                    status.save_count += 1;
                    status.error = None;
                    status.pending_changes = pending;
                });
                state.last_write = Some(report);
            }
            Err(err) => {
                metrics::record_write(WriteOutcome::Failed);
                state.failed_attempts += 1;
                let attempt = state.failed_attempts;
                if attempt < self.config.retry_attempts {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        key = %self.key,
                        attempt,
                        retry_in = ?delay,
                        error = %err,
                        "save failed, retrying"
                    );
                    state.phase = SavePhase::Retrying;
                    self.arm_retry(&mut state, attempt);
                    self.status.send_modify(|status| {
                        status.is_saving = true;
                        status.pending_changes = true;
                    });
                } else {
                    error!(
                        key = %self.key,
                        attempts = attempt,
                        error = %err,
                        "save failed, giving up; draft held in memory"
                    );
                    state.failed_attempts = 0;
                    state.phase = if state.debounce.is_armed() {
                        SavePhase::PendingSave
                    } else {
                        SavePhase::Idle
                    };
                    let pending = state.has_pending();
                    self.status.send_modify(|status| {
                        status.is_saving = false;
                        status.error = Some(err.to_string());
                        status.pending_changes = pending;
                    });
                }
            }
        }
    }

    /// Re-drives the durable phase of a degraded write. `failed` counts
    /// the durable attempts made so far.
    async fn retry_durable(self: &Arc<Self>, epoch: u64, failed: u32) {
        let _gate = self.save_gate.lock().await;
        let snapshot = {
            let state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            state.buffer.clone()
        };

        metrics::record_retry(RetryKind::Durable);
        let err = match self.coordinator.write_durable(&self.key, &snapshot).await {
            Ok(_) => {
                info!(key = %self.key, attempt = failed + 1, "durable retry succeeded");
                return;
            }
            Err(err) => err,
        };

        let attempt = failed + 1;
        if err.is_schema_conflict() || attempt >= self.config.retry_attempts {
            warn!(
                key = %self.key,
                attempts = attempt,
                error = %err,
                "durable retries exhausted, draft held in fast cache only"
            );
            return;
        }

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        warn!(
            key = %self.key,
            attempt,
            retry_in = ?self.config.retry_delay(attempt),
            error = %err,
            "durable retry failed"
        );
        self.arm_durable_retry(&mut state, attempt);
    }
}
