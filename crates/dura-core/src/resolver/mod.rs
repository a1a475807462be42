//! # Resumable resolver
//!
//! Resolves one asynchronous value exactly once, across controller restarts.
//!
//! A [`Resolve`] implementation owns the resolution step and declares the small
//! [`Resolve::State`] that survives a restart. [`ResumableResolver`] drives it on the backoff
//! [`Poller`](crate::poller::Poller) and checkpoints the state into the context's record store
//! whenever it changes:
//!
//! ```text
//! start()  ── save(state) ─┐
//!                          ├─► attempt: try_resolve() ─► checkpoint if state changed
//! resume() ────────────────┘        Ok(None) / transient ─► Pending
//!                                   Ok(Some(v))          ─► Resolved(v)
//!                                   other error          ─► Failed(e)
//! terminal ─► release() if canceled ─► remove checkpoint ─► deliver once
//! ```
//!
//! `resume()` re-enters exactly the same resolution step, so the step must be idempotent for
//! a given persisted state.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, trace, warn};

use dura_model::PollPolicy;

use crate::{
    context::PollContext,
    error::{CoreError, ResolveError},
    metrics::OperationOutcome,
    poller::{Attempt, Outcome, PollControl, PollError, Poller},
    store::save_record,
};

/// One resolution strategy.
#[async_trait]
pub trait Resolve: Send + Sync + 'static {
    type Value: Send + 'static;
    /// Minimal restart-survivable state.
    type State: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Metrics / log label for this family of operations.
    fn kind(&self) -> &'static str;

    /// Snapshot of the persisted state.
    fn state(&self) -> Self::State;

    /// One idempotent resolution step.
    ///
    /// `Ok(None)` means not ready yet. Transient errors are retried; every other error is
    /// terminal.
    async fn try_resolve(&self) -> Result<Option<Self::Value>, ResolveError>;

    /// Human-readable description of what the operation is waiting for.
    async fn waiting_status(&self) -> String;

    /// Reported instead of [`Resolve::waiting_status`] when that does not answer in time.
    fn stalled_status(&self) -> String {
        format!("Waiting for {} (no response)", self.kind())
    }

    /// Release any downstream resource after cancellation.
    async fn release(&self) -> Result<(), ResolveError> {
        Ok(())
    }
}

/// Builder for one resolution.
pub struct ResumableResolver<R: Resolve> {
    ctx: PollContext,
    policy: PollPolicy,
    key: Option<String>,
    resolve: Arc<R>,
}

impl<R: Resolve> ResumableResolver<R> {
    pub fn new(ctx: PollContext, resolve: R) -> Self {
        Self {
            ctx,
            policy: PollPolicy::default(),
            key: None,
            resolve: Arc::new(resolve),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checkpoint the persisted state under `key` (requires a store in the context).
    pub fn checkpoint(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Start a fresh resolution; the initial state is saved before the first attempt.
    pub fn start(self) -> Result<Resolution<R>, CoreError> {
        self.policy.validate()?;
        let state = self.resolve.state();
        if let (Some(store), Some(key)) = (self.ctx.store(), self.key.as_deref()) {
            save_record(store.as_ref(), key, &state)?;
        }
        debug!(kind = self.resolve.kind(), key = ?self.key, "resolution started");
        self.run(Some(state))
    }

    /// Re-enter polling from a persisted state; the resolve step was built from that state.
    pub fn resume(self) -> Result<Resolution<R>, CoreError> {
        self.policy.validate()?;
        debug!(kind = self.resolve.kind(), key = ?self.key, "resolution resumed");
        let state = self.resolve.state();
        self.run(Some(state))
    }

    fn run(self, saved: Option<R::State>) -> Result<Resolution<R>, CoreError> {
        let kind = self.resolve.kind();
        let limit = self.policy.attempt_timeout();
        let attempt = ResolveAttempt {
            resolve: Arc::clone(&self.resolve),
            ctx: self.ctx.clone(),
            key: self.key.clone(),
            saved,
        };
        let poll = Poller::new(self.ctx.timer().clone(), self.policy)
            .named(kind)
            .start(attempt, Duration::ZERO)?;

        let handle = ResolverHandle {
            resolve: Arc::clone(&self.resolve),
            control: poll.control(),
            limit,
        };

        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        let resolve = Arc::clone(&self.resolve);
        let ctx = self.ctx;
        let key = self.key;
        let timer = ctx.timer().clone();
        timer.spawn(async move {
            let result = finish(&ctx, key.as_deref(), resolve.as_ref(), limit, poll.wait().await).await;
            if !matches!(result, Err(ResolveError::Suspended(_))) {
                let outcome = match &result {
                    Ok(_) => OperationOutcome::Resolved,
                    Err(e) => OperationOutcome::from_error(e),
                };
                ctx.metrics().record_outcome(
                    kind,
                    outcome,
                    started.elapsed().as_millis() as u64,
                );
            }
            let _ = tx.send(result);
        })?;

        Ok(Resolution { handle, rx })
    }
}

/// Terminal bookkeeping, run once after the poll loop ended and no attempt is in flight.
///
/// `release` is bounded by `limit`; cancellation is delivered whether or not it succeeded.
async fn finish<R: Resolve>(
    ctx: &PollContext,
    key: Option<&str>,
    resolve: &R,
    limit: Duration,
    result: Result<R::Value, PollError<ResolveError>>,
) -> Result<R::Value, ResolveError> {
    let result = match result {
        Ok(v) => Ok(v),
        Err(PollError::Failed(e)) => Err(e),
        Err(PollError::Canceled(cause)) => {
            match tokio::time::timeout(limit, resolve.release()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(kind = resolve.kind(), error = %e, "failed to release downstream resource")
                }
                Err(_) => {
                    warn!(kind = resolve.kind(), timeout = ?limit, "downstream release timed out")
                }
            }
            Err(ResolveError::Canceled(cause))
        }
        Err(PollError::Shutdown) => {
            debug!(kind = resolve.kind(), ?key, "timer shut down; keeping checkpoint");
            return Err(ResolveError::Suspended("controller shutting down".into()));
        }
    };

    if let (Some(store), Some(key)) = (ctx.store(), key) {
        if let Err(e) = store.remove(key) {
            warn!(key, error = %e, "failed to remove checkpoint");
        }
    }
    result
}

struct ResolveAttempt<R: Resolve> {
    resolve: Arc<R>,
    ctx: PollContext,
    key: Option<String>,
    saved: Option<R::State>,
}

impl<R: Resolve> ResolveAttempt<R> {
    fn checkpoint(&mut self) {
        let (Some(store), Some(key)) = (self.ctx.store(), self.key.as_deref()) else {
            return;
        };
        let state = self.resolve.state();
        if self.saved.as_ref() == Some(&state) {
            return;
        }
        match save_record(store.as_ref(), key, &state) {
            Ok(()) => {
                trace!(key, "checkpoint saved");
                self.saved = Some(state);
            }
            Err(e) => warn!(key, error = %e, "failed to save checkpoint"),
        }
    }
}

#[async_trait]
impl<R: Resolve> Attempt for ResolveAttempt<R> {
    type Output = R::Value;
    type Error = ResolveError;

    async fn attempt(&mut self) -> Outcome<R::Value, ResolveError> {
        let kind = self.resolve.kind();
        self.ctx.metrics().record_attempt(kind);

        let result = self.resolve.try_resolve().await;
        self.checkpoint();

        match result {
            Ok(Some(v)) => Outcome::Resolved(v),
            Ok(None) => Outcome::Pending,
            Err(e) if e.is_transient() => {
                debug!(kind, error = %e, "transient condition; retrying");
                self.ctx.metrics().record_transient(kind, e.as_label());
                Outcome::Pending
            }
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Clonable consumer-side view of a running resolution.
pub struct ResolverHandle<R: Resolve> {
    resolve: Arc<R>,
    control: PollControl,
    limit: Duration,
}

impl<R: Resolve> Clone for ResolverHandle<R> {
    fn clone(&self) -> Self {
        Self {
            resolve: Arc::clone(&self.resolve),
            control: self.control.clone(),
            limit: self.limit,
        }
    }
}

impl<R: Resolve> ResolverHandle<R> {
    /// Stop polling; the downstream resource is released once the loop has wound down.
    ///
    /// Idempotent: returns `true` only for the call that initiated cancellation.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        self.control.cancel(cause)
    }

    /// Current waiting description, answered within the attempt timeout.
    pub async fn status(&self) -> String {
        match tokio::time::timeout(self.limit, self.resolve.waiting_status()).await {
            Ok(status) => status,
            Err(_) => {
                debug!(kind = self.resolve.kind(), timeout = ?self.limit, "status lookup timed out");
                self.resolve.stalled_status()
            }
        }
    }

    /// Snapshot of the persisted state.
    pub fn state(&self) -> R::State {
        self.resolve.state()
    }

    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    pub fn attempts(&self) -> u64 {
        self.control.attempts()
    }

    pub fn interval(&self) -> Duration {
        self.control.interval()
    }
}

/// A running resolution: the handle plus the single-use outcome.
pub struct Resolution<R: Resolve> {
    handle: ResolverHandle<R>,
    rx: oneshot::Receiver<Result<R::Value, ResolveError>>,
}

impl<R: Resolve> Resolution<R> {
    pub fn handle(&self) -> ResolverHandle<R> {
        self.handle.clone()
    }

    /// Wait for the delivered outcome.
    pub async fn wait(self) -> Result<R::Value, ResolveError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(ResolveError::Suspended("controller shutting down".into())))
    }
}
