use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use dura_model::SubmissionId;

use crate::error::ResolveError;

/// Start signal of a scheduled item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartState<H> {
    /// Still queued.
    NotStarted,
    /// The item was canceled before it started.
    Canceled,
    /// The item started; the execution handle may not be attached yet.
    Started(Option<H>),
}

/// What the scheduler currently knows about one submitted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView<H> {
    pub id: SubmissionId,
    pub start: StartState<H>,
    /// Why the item has not started yet, if the scheduler can tell.
    pub blockage: Option<String>,
}

impl<H> ItemView<H> {
    pub fn queued(id: SubmissionId) -> Self {
        Self {
            id,
            start: StartState::NotStarted,
            blockage: None,
        }
    }

    pub fn blocked(mut self, cause: impl Into<String>) -> Self {
        self.blockage = Some(cause.into());
        self
    }
}

/// Work-item scheduler that hands out execution slots.
#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Restart-survivable description of the work to (re)submit.
    type Work: Clone
        + PartialEq
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;
    /// Concrete execution slot handed out once the item starts.
    type Handle: Send + 'static;

    /// Submit `work`; `Ok(None)` means the scheduler refused it.
    async fn submit(&self, work: &Self::Work) -> Result<Option<SubmissionId>, ResolveError>;

    /// Look up a submitted item; `Ok(None)` if the scheduler no longer knows it.
    async fn item(&self, id: SubmissionId)
    -> Result<Option<ItemView<Self::Handle>>, ResolveError>;

    /// Ask the scheduler to drop the item; `Ok(false)` if it could not.
    async fn cancel(&self, id: SubmissionId) -> Result<bool, ResolveError>;
}
