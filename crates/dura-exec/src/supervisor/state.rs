use std::fmt;

use tokio::time::Instant;

use dura_core::{poller::Backoff, timer::Scheduled};
use dura_model::PollPolicy;

/// Externally visible lifecycle of a supervised task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Check cycles are running.
    Polling,
    /// Interrupt sent; waiting for the task to end before the grace period expires.
    Stopping,
    /// Delivered a value.
    Succeeded,
    /// Delivered an error.
    Failed,
    /// The controller shut down; the record is kept for a later resume.
    Suspended,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Polling => "polling",
            Phase::Stopping => "stopping",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Armed stop: the cause to deliver and the grace timer that escalates to it.
#[derive(Debug)]
pub(crate) struct PendingStop {
    pub(crate) cause: String,
    pub(crate) grace: Scheduled,
    pub(crate) deadline: Instant,
}

/// Transient polling state. Never persisted.
#[derive(Debug)]
pub(crate) struct PollState {
    pub(crate) backoff: Backoff,
    pub(crate) stop: Option<PendingStop>,
}

impl PollState {
    /// Rebuild from configuration alone: minimum interval, no timers armed.
    ///
    /// Used for both launch and resume, so nothing in here may depend on a previous run.
    pub(crate) fn derive(policy: &PollPolicy) -> Self {
        Self {
            backoff: Backoff::new(policy),
            stop: None,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        if self.stop.is_some() {
            Phase::Stopping
        } else {
            Phase::Polling
        }
    }

    /// Disarm the grace timer, if any, and return the stop it belonged to.
    pub(crate) fn disarm(&mut self) -> Option<PendingStop> {
        let stop = self.stop.take()?;
        stop.grace.cancel();
        Some(stop)
    }
}
