//! Prometheus backend for dura poll-loop metrics.
//!
//! [`PrometheusMetrics`] implements [`dura_core::metrics::MetricsBackend`]; inject it through
//! [`dura_core::PollContext::with_metrics`] and expose [`PrometheusMetrics::gather`] (or
//! [`PrometheusMetrics::encode_text`]) from whatever HTTP surface the host process already has.
//!
//! ```rust
//! use std::sync::Arc;
//! use dura_core::{PollContext, timer::Timer};
//! use dura_prometheus::PrometheusMetrics;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = PollContext::new(Timer::current()?).with_metrics(Arc::new(metrics.clone()));
//! # let _ = ctx;
//! let body = metrics.encode_text()?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `dura_poll_attempts_total{kind}`: counter
//! - `dura_operations_completed_total{kind, outcome}`: counter
//! - `dura_operation_duration_seconds{kind}`: histogram
//! - `dura_transient_conditions_total{kind, label}`: counter
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
