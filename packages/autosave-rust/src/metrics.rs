//! Counters emitted through the `metrics` facade.
//!
//! Nothing is recorded unless the host installs a recorder (for example a
//! Prometheus exporter). Counter names:
//!
//! - `autosave_writes_total{outcome}`: `complete`, `degraded`, `failed`
//! - `autosave_retries_total{kind}`: `write`, `durable`
//! - `autosave_schema_recoveries_total`
//! - `autosave_flushes_total{trigger}`: `forced`, `hidden`, `teardown`

/// Result of one coordinator write, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Both backends confirmed.
    Complete,
    /// Exactly one backend confirmed.
    Degraded,
    /// Neither backend confirmed.
    Failed,
}

impl WriteOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

/// What a scheduled retry re-drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// A full two-backend write after both failed.
    Write,
    /// The durable phase of a degraded write.
    Durable,
}

impl RetryKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Durable => "durable",
        }
    }
}

/// Why the engine wrote outside its debounce cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Explicit `force_save`.
    Forced,
    /// The host became hidden.
    Hidden,
    /// The host is tearing down.
    Teardown,
}

impl FlushTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::Hidden => "hidden",
            Self::Teardown => "teardown",
        }
    }
}

pub(crate) fn record_write(outcome: WriteOutcome) {
    ::metrics::counter!("autosave_writes_total", "outcome" => outcome.as_str()).increment(1);
}

pub(crate) fn record_retry(kind: RetryKind) {
    ::metrics::counter!("autosave_retries_total", "kind" => kind.as_str()).increment(1);
}

pub(crate) fn record_schema_recovery() {
    ::metrics::counter!("autosave_schema_recoveries_total").increment(1);
}

pub(crate) fn record_flush(trigger: FlushTrigger) {
    ::metrics::counter!("autosave_flushes_total", "trigger" => trigger.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(WriteOutcome::Degraded.as_str(), "degraded");
        assert_eq!(RetryKind::Durable.as_str(), "durable");
        assert_eq!(FlushTrigger::Teardown.as_str(), "teardown");
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        record_write(WriteOutcome::Complete);
        record_retry(RetryKind::Write);
        record_schema_recovery();
        record_flush(FlushTrigger::Forced);
    }
}
