//! # Backoff poller
//!
//! Repeatedly runs one [`Attempt`] on the shared [`Timer`] until it resolves, fails, or is
//! cancelled.
//!
//! ```text
//! start ─► sleep(first_delay) ─► attempt ─┬─ Resolved(v) ─► deliver Ok(v)
//!                 ▲                       ├─ Failed(e)   ─► deliver Err(Failed(e))
//!                 │                       ├─ Pending     ─► delay = backoff.after(false)
//!                 └───────────────────────┴─ Active      ─► delay = backoff.after(true)
//! cancel(cause) at any point ─► deliver Err(Canceled(cause)), no further attempts
//! ```
//!
//! ## Rules
//! - Attempts run strictly one after another; the next sleep starts only after the previous
//!   attempt returned.
//! - Each attempt is bounded by `PollPolicy::attempt_timeout`; an attempt that overruns counts
//!   as `Pending`.
//! - The outcome is delivered exactly once.
//! - Cancellation is idempotent and never interrupts an attempt already in flight; it wins over
//!   whatever that attempt returns.
mod backoff;
pub use backoff::Backoff;

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace};

use dura_model::PollPolicy;

use crate::{error::CoreError, timer::Timer};

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// Not ready; retry after the (growing) interval.
    Pending,
    /// Not ready, but new activity was observed; retry at the minimum interval.
    Active,
    /// Terminal success.
    Resolved(T),
    /// Terminal failure, never retried.
    Failed(E),
}

/// One idempotent check of whether an asynchronous value is ready.
#[async_trait]
pub trait Attempt: Send + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    async fn attempt(&mut self) -> Outcome<Self::Output, Self::Error>;
}

/// Why a poll loop ended without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// Cancelled through [`PollControl::cancel`]; carries the first cause given.
    Canceled(String),
    /// The attempt reported a terminal failure.
    Failed(E),
    /// The timer shut down before the operation finished.
    Shutdown,
}

#[derive(Debug, Default)]
struct Shared {
    token: CancellationToken,
    cause: OnceLock<String>,
    interval_ms: AtomicU64,
    attempts: AtomicU64,
    finished: AtomicBool,
}

/// Clonable control surface of a running poll loop.
#[derive(Clone, Debug)]
pub struct PollControl {
    shared: Arc<Shared>,
}

impl PollControl {
    /// Stop scheduling further attempts.
    ///
    /// Returns `true` only for the call that actually initiated cancellation;
    /// repeated calls and calls after the loop finished are no-ops.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        if self.is_finished() {
            return false;
        }
        let first = self.shared.cause.set(cause.into()).is_ok();
        self.shared.token.cancel();
        first
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Delay currently used before the next attempt.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Acquire))
    }

    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    fn cause(&self) -> String {
        self.shared
            .cause
            .get()
            .cloned()
            .unwrap_or_else(|| "canceled".to_string())
    }
}

/// Owner side of a poll loop: control plus the single-use result.
#[derive(Debug)]
pub struct PollHandle<T, E> {
    control: PollControl,
    rx: oneshot::Receiver<Result<T, PollError<E>>>,
}

impl<T, E> PollHandle<T, E> {
    pub fn control(&self) -> PollControl {
        self.control.clone()
    }

    /// Wait for the delivered outcome.
    pub async fn wait(self) -> Result<T, PollError<E>> {
        self.rx.await.unwrap_or(Err(PollError::Shutdown))
    }
}

/// Builder for a poll loop.
pub struct Poller {
    timer: Timer,
    policy: PollPolicy,
    name: String,
}

impl Poller {
    pub fn new(timer: Timer, policy: PollPolicy) -> Self {
        Self {
            timer,
            policy,
            name: "poll".to_string(),
        }
    }

    /// Name used in log spans.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Start polling; the first attempt runs after `first_delay`.
    pub fn start<A: Attempt>(
        self,
        attempt: A,
        first_delay: Duration,
    ) -> Result<PollHandle<A::Output, A::Error>, CoreError> {
        let control = PollControl {
            shared: Arc::new(Shared::default()),
        };
        let (tx, rx) = oneshot::channel();

        let span = info_span!("poll", op = %self.name);
        let run = PollLoop {
            attempt,
            backoff: Backoff::new(&self.policy),
            timeout: self.policy.attempt_timeout(),
            control: control.clone(),
            shutdown: self.timer.child_token(),
        };
        self.timer
            .spawn(async move {
                let result = run.run(first_delay).await;
                let _ = tx.send(result);
            }
            .instrument(span))?;

        Ok(PollHandle { control, rx })
    }
}

struct PollLoop<A: Attempt> {
    attempt: A,
    backoff: Backoff,
    timeout: Duration,
    control: PollControl,
    shutdown: CancellationToken,
}

impl<A: Attempt> PollLoop<A> {
    async fn run(mut self, first_delay: Duration) -> Result<A::Output, PollError<A::Error>> {
        let shared = Arc::clone(&self.control.shared);
        let mut delay = first_delay;

        let result = loop {
            shared
                .interval_ms
                .store(delay.as_millis() as u64, Ordering::Release);

            tokio::select! {
                biased;
                _ = shared.token.cancelled() => break Err(PollError::Canceled(self.control.cause())),
                _ = self.shutdown.cancelled() => break Err(PollError::Shutdown),
                _ = tokio::time::sleep(delay) => {}
            }
            let n = shared.attempts.fetch_add(1, Ordering::AcqRel) + 1;

            let outcome = match tokio::time::timeout(self.timeout, self.attempt.attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(attempt = n, timeout = ?self.timeout, "attempt timed out; treating as pending");
                    Outcome::Pending
                }
            };
            if shared.token.is_cancelled() {
                break Err(PollError::Canceled(self.control.cause()));
            }

            delay = match outcome {
                Outcome::Resolved(v) => break Ok(v),
                Outcome::Failed(e) => break Err(PollError::Failed(e)),
                Outcome::Pending => self.backoff.after(false),
                Outcome::Active => self.backoff.after(true),
            };
            trace!(attempt = n, next = ?delay, "not ready yet");
        };

        shared.finished.store(true, Ordering::Release);
        result
    }
}
