//! Metrics collection abstraction for poll loops.
//!
//! Backends (prometheus, statsd, ...) implement [`MetricsBackend`] and are injected via
//! [`crate::PollContext`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, OperationOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Operation families reported as the `kind` label.
pub mod kind {
    /// Process Supervisor check cycles.
    pub const PROCESS: &str = "process";
    /// Slot Rehydrator attempts.
    pub const SLOT: &str = "slot";
}

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
