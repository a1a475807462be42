use std::fmt;

use crate::{
    metrics::{MetricsHandle, noop_metrics},
    store::StoreHandle,
    timer::Timer,
};

/// Shared dependencies handed to every poll loop.
#[derive(Clone)]
pub struct PollContext {
    timer: Timer,
    metrics: MetricsHandle,
    store: Option<StoreHandle>,
}

impl PollContext {
    /// Context with no-op metrics and no checkpointing.
    pub fn new(timer: Timer) -> Self {
        Self {
            timer,
            metrics: noop_metrics(),
            store: None,
        }
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Store used for checkpoints, if any.
    pub fn store(&self) -> Option<&StoreHandle> {
        self.store.as_ref()
    }

    /// Replace the metrics backend and return updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Enable checkpointing into `store`.
    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self
    }
}

impl fmt::Debug for PollContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollContext")
            .field("timer", &self.timer)
            .field("metrics", &"<handle>")
            .field("store", &self.store.as_ref().map(|_| "<handle>"))
            .finish()
    }
}

impl fmt::Display for PollContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PollContext(store={}, shutdown={})",
            self.store.is_some(),
            self.timer.is_shutdown()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PollContext;
    use crate::{store::MemoryRecordStore, timer::Timer};
    use std::sync::Arc;

    #[tokio::test]
    async fn new_context_has_no_store() {
        let ctx = PollContext::new(Timer::current().unwrap());
        assert!(ctx.store().is_none());
        assert_eq!(ctx.to_string(), "PollContext(store=false, shutdown=false)");
    }

    #[tokio::test]
    async fn with_store_enables_checkpointing() {
        let ctx = PollContext::new(Timer::current().unwrap())
            .with_store(Arc::new(MemoryRecordStore::new()))
            .with_metrics(crate::metrics::noop_metrics());
        assert!(ctx.store().is_some());
        ctx.metrics().record_attempt("slot");
    }
}
