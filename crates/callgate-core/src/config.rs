use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GateError, Result};

/// Static configuration of a call filter. Read on every decision, never written after
/// the filter is built.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    /// Retry window. A rejected call whose elapsed wait reaches this value is cancelled.
    pub max_retry_duration_ms: u64,
    /// Constant delay advised between retries.
    pub retry_delay_ms: u64,
    /// Let a blocked caller pump unrelated queued messages while it waits.
    pub pump_while_blocked: bool,
    /// Refuse calls that would re-enter a thread blocked on its own outgoing call.
    pub reject_reentrant_calls: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_retry_duration_ms: 5000,
            retry_delay_ms: 50,
            pump_while_blocked: true,
            reject_reentrant_calls: false,
        }
    }
}

impl FilterConfig {
    pub fn with_max_retry_duration(mut self, window: Duration) -> Self {
        self.max_retry_duration_ms = window.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn max_retry_duration(&self) -> Duration {
        Duration::from_millis(self.max_retry_duration_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: FilterConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_delay_ms == 0 {
            return Err(GateError::InvalidConfig(
                "retry_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
