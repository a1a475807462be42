//! Injectable scheduling service shared by every poll loop.
//!
//! A [`Timer`] wraps a tokio runtime handle plus a root cancellation token tied to the
//! controller process lifetime. Components take it as a dependency instead of reaching for a
//! global executor, so tests can drive it with a paused clock.
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::CoreError;

/// Process-wide timer-driven executor.
///
/// Cloning is cheap; all clones share the same shutdown token.
#[derive(Clone, Debug)]
pub struct Timer {
    handle: Handle,
    shutdown: CancellationToken,
}

impl Timer {
    /// Build a timer on top of an explicit runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build a timer on the runtime the caller is running in.
    pub fn current() -> Result<Self, CoreError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| CoreError::NoRuntime(e.to_string()))
    }

    /// Token cancelled when the timer shuts down.
    ///
    /// Each caller gets a child token, so cancelling it never affects siblings.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop every loop and pending one-shot scheduled through this timer.
    pub fn shutdown(&self) {
        debug!("timer shutdown requested");
        self.shutdown.cancel();
    }

    /// Spawn a long-lived loop on the timer's runtime.
    pub fn spawn<F>(&self, fut: F) -> Result<JoinHandle<F::Output>, CoreError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(CoreError::Shutdown);
        }
        Ok(self.handle.spawn(fut))
    }

    /// Run `fut` once after `delay` unless the returned [`Scheduled`] is cancelled first.
    pub fn schedule<F>(&self, delay: Duration, fut: F) -> Result<Scheduled, CoreError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduled = Scheduled {
            token: self.child_token(),
            done: Arc::new(AtomicBool::new(false)),
        };
        let token = scheduled.token.clone();
        let done = Arc::clone(&scheduled.done);

        self.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!(?delay, "scheduled callback cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    fut.await;
                    done.store(true, Ordering::Release);
                }
            }
        })?;
        Ok(scheduled)
    }
}

/// Handle to a one-shot callback armed via [`Timer::schedule`].
#[derive(Clone, Debug)]
pub struct Scheduled {
    token: CancellationToken,
    done: Arc<AtomicBool>,
}

impl Scheduled {
    /// Prevent the callback from running; no-op if it already ran.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() && !self.is_done()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}
