//! Autosave engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backends the storage coordinator writes to.
///
/// Reserved: the coordinator currently writes to both backends regardless
/// of the selected strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageStrategy {
    /// Fast cache and durable store.
    #[default]
    Hybrid,
    /// Fast cache only.
    FastCacheOnly,
}

/// Errors from loading an [`AutoSaveConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid autosave config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("retryAttempts must be at least 1")]
    NoAttempts,
}

/// Engine tuning, deserializable from the host's camelCase options object.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSaveConfig {
    /// Coalescing window in milliseconds.
    pub debounce_ms: u64,
    /// Total write attempts (first try included) before a failure is
    /// surfaced.
    pub retry_attempts: u32,
    /// Backoff base in milliseconds; attempt `n + 1` waits
    /// `retry_base_delay_ms * 2^(n - 1)`.
    pub retry_base_delay_ms: u64,
    /// Reserved backend selection.
    pub storage_strategy: StorageStrategy,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            storage_strategy: StorageStrategy::Hybrid,
        }
    }
}

impl AutoSaveConfig {
    /// Parses a JSON options object and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed JSON or a zero attempt budget.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoAttempts`] when `retry_attempts` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(())
    }

    /// Debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay before the attempt following failed attempt number `failed`
    /// (1-based): `base * 2^(failed - 1)`, saturating.
    #[must_use]
    pub fn retry_delay(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(31);
        let factor = 1u64 << exponent;
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}
