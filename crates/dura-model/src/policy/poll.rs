use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::{
    TimeoutMs,
    error::{ModelError, ModelResult},
};

/// Adaptive polling bounds shared by every poll loop.
///
/// The interval starts at `min_ms`, grows by `factor` after each idle attempt up to `max_ms`
/// and snaps back to `min_ms` whenever an attempt observes new activity.
/// `attempt_timeout_ms` bounds a single call into an external collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct PollPolicy {
    pub min_ms: TimeoutMs,
    pub max_ms: TimeoutMs,
    pub factor: f64,
    pub attempt_timeout_ms: TimeoutMs,
}

impl PollPolicy {
    pub const DEFAULT_MIN_MS: TimeoutMs = 250;
    pub const DEFAULT_MAX_MS: TimeoutMs = 15_000;
    pub const DEFAULT_FACTOR: f64 = 1.2;
    pub const DEFAULT_ATTEMPT_TIMEOUT_MS: TimeoutMs = 10_000;

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Rules:
    /// - `min_ms` is positive;
    /// - `max_ms >= min_ms`;
    /// - `factor` is finite and `>= 1.0`;
    /// - `attempt_timeout_ms` is positive.
    pub fn validate(&self) -> ModelResult<()> {
        if self.min_ms == 0 {
            return Err(ModelError::InvalidPolicy("minMs must be positive".into()));
        }
        if self.max_ms < self.min_ms {
            return Err(ModelError::InvalidPolicy(format!(
                "maxMs ({}) is below minMs ({})",
                self.max_ms, self.min_ms
            )));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ModelError::InvalidPolicy(format!(
                "factor must be >= 1.0, got {}",
                self.factor
            )));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ModelError::InvalidPolicy(
                "attemptTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            min_ms: Self::DEFAULT_MIN_MS,
            max_ms: Self::DEFAULT_MAX_MS,
            factor: Self::DEFAULT_FACTOR,
            attempt_timeout_ms: Self::DEFAULT_ATTEMPT_TIMEOUT_MS,
        }
    }
}
