use crate::metrics::backend::{MetricsBackend, OperationOutcome};

/// Metrics backend that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_attempt(&self, _: &str) {}

    #[inline(always)]
    fn record_outcome(&self, _: &str, _: OperationOutcome, _: u64) {}

    #[inline(always)]
    fn record_transient(&self, _: &str, _: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;

    #[test]
    fn noop_metrics_is_zero_size() {
        assert_eq!(std::mem::size_of::<NoOpMetrics>(), 0);
    }

    #[test]
    fn outcome_labels_follow_error_kind() {
        let canceled = ResolveError::Canceled("stop".into());
        let failed = ResolveError::Refused("queue refused".into());

        assert_eq!(OperationOutcome::from_error(&canceled).as_label(), "canceled");
        assert_eq!(OperationOutcome::from_error(&failed).as_label(), "failed");

        let m = NoOpMetrics;
        m.record_attempt("slot");
        m.record_outcome("slot", OperationOutcome::Resolved, 10);
        m.record_transient("process", "unreachable");
    }
}
