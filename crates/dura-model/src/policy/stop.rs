use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::TimeoutMs;

/// How long a stopped task may keep running after the interrupt signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct StopPolicy {
    pub grace_ms: TimeoutMs,
}

impl StopPolicy {
    pub const DEFAULT_GRACE_MS: TimeoutMs = 10_000;

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            grace_ms: Self::DEFAULT_GRACE_MS,
        }
    }
}
