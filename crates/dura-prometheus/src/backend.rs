use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use dura_core::metrics::{MetricsBackend, OperationOutcome};

/// Durable operations run from seconds to days.
const DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3_600.0, 14_400.0, 86_400.0,
];

/// Prometheus implementation of [`MetricsBackend`].
///
/// Label values are bounded: `kind` is one of [`dura_core::metrics::kind`], `outcome` one of
/// `resolved | failed | canceled`, and `label` a `ResolveError::as_label` value.
#[derive(Clone)]
pub struct PrometheusMetrics {
    attempts: CounterVec,
    completed: CounterVec,
    duration: HistogramVec,
    transient: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register the dura collectors on `registry`.
    ///
    /// Fails if the registry already holds collectors with the same names.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let attempts = CounterVec::new(
            Opts::new(
                "dura_poll_attempts_total",
                "Resolution attempts and check cycles run by poll loops",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(attempts.clone()))?;

        let completed = CounterVec::new(
            Opts::new(
                "dura_operations_completed_total",
                "Durable operations that reached a terminal outcome",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(completed.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "dura_operation_duration_seconds",
                "Time from start or resume to terminal outcome",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["kind"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let transient = CounterVec::new(
            Opts::new(
                "dura_transient_conditions_total",
                "Transient conditions absorbed by poll loops",
            ),
            &["kind", "label"],
        )?;
        registry.register(Box::new(transient.clone()))?;

        Ok(Self {
            attempts,
            completed,
            duration,
            transient,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready to serve from a `/metrics` endpoint.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_attempt(&self, kind: &str) {
        self.attempts.with_label_values(&[kind]).inc();
    }

    fn record_outcome(&self, kind: &str, outcome: OperationOutcome, duration_ms: u64) {
        self.completed
            .with_label_values(&[kind, outcome.as_label()])
            .inc();
        self.duration
            .with_label_values(&[kind])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_transient(&self, kind: &str, label: &str) {
        self.transient.with_label_values(&[kind, label]).inc();
    }
}

#[cfg(test)]
mod tests {
    use dura_core::metrics::kind;

    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("{name} not gathered"))
    }

    #[test]
    fn attempts_are_counted_per_kind() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_attempt(kind::PROCESS);
        metrics.record_attempt(kind::PROCESS);
        metrics.record_attempt(kind::SLOT);

        let families = metrics.gather();
        assert_eq!(family(&families, "dura_poll_attempts_total").get_metric().len(), 2);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"dura_poll_attempts_total{kind="process"} 2"#));
        assert!(text.contains(r#"dura_poll_attempts_total{kind="slot"} 1"#));
    }

    #[test]
    fn outcome_feeds_counter_and_histogram() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_outcome(kind::PROCESS, OperationOutcome::Resolved, 1_500);
        metrics.record_outcome(kind::PROCESS, OperationOutcome::Canceled, 12_000);

        let families = metrics.gather();
        assert_eq!(
            family(&families, "dura_operations_completed_total")
                .get_metric()
                .len(),
            2
        );

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"dura_operation_duration_seconds_count{kind="process"} 2"#));
        assert!(text.contains(r#"dura_operation_duration_seconds_sum{kind="process"} 13.5"#));
        assert!(text.contains(
            r#"dura_operations_completed_total{kind="process",outcome="canceled"} 1"#
        ));
    }

    #[test]
    fn transient_conditions_keep_their_label() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_transient(kind::SLOT, "unreachable");
        metrics.record_transient(kind::SLOT, "unreachable");
        metrics.record_transient(kind::PROCESS, "not_ready");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"dura_transient_conditions_total{kind="slot",label="unreachable"} 2"#));
        assert!(text.contains(r#"dura_transient_conditions_total{kind="process",label="not_ready"} 1"#));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        PrometheusMetrics::new_with_registry(Arc::clone(&registry)).unwrap();
        assert!(PrometheusMetrics::new_with_registry(registry).is_err());
    }
}
