use std::sync::Arc;

use crate::error::ResolveError;

/// How a tracked operation ended, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Resolved with a value.
    Resolved,
    /// Ended with a terminal error.
    Failed,
    /// Canceled by the consumer or by an expired stop grace period.
    Canceled,
}

impl OperationOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationOutcome::Resolved => "resolved",
            OperationOutcome::Failed => "failed",
            OperationOutcome::Canceled => "canceled",
        }
    }

    /// Classify a terminal error.
    pub fn from_error(err: &ResolveError) -> Self {
        match err {
            ResolveError::Canceled(_) => OperationOutcome::Canceled,
            _ => OperationOutcome::Failed,
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are injected via [`crate::PollContext`] and shared by every poll loop.
/// `kind` names the operation family (see [`crate::metrics::kind`]).
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record one resolution attempt or check cycle.
    fn record_attempt(&self, kind: &str);
    /// Record a terminal outcome with the total time since start (or resume).
    fn record_outcome(&self, kind: &str, outcome: OperationOutcome, duration_ms: u64);
    /// Record a transient condition absorbed by the loop (unreachable worker, attempt timeout).
    fn record_transient(&self, kind: &str, label: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
