//! Error types used by the polling core.
//!
//! - [`ResolveError`] classifies why a resolution attempt did not produce a value.
//! - [`CoreError`] covers infrastructure failures (timer, record store).
use thiserror::Error;

use dura_model::ModelError;

/// Outcome classification for a failed resolution attempt.
///
/// Two kinds are transient ([`ResolveError::Unreachable`], [`ResolveError::NotReady`]):
/// poll loops absorb them and try again later. Every other kind is terminal and is delivered
/// exactly once to the consumer of the operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A worker or collaborator is temporarily unavailable.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The operation is still pending.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A submission or launch was structurally rejected.
    #[error("refused: {0}")]
    Refused(String),

    /// The operation was canceled by the caller or by a timeout-driven stop.
    #[error("canceled: {0}")]
    Canceled(String),

    /// An expected post-condition did not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The workspace path exists on a reachable worker but is not usable.
    #[error("missing workspace {path} on {worker}")]
    MissingWorkspace { path: String, worker: String },

    /// The external task completed abnormally.
    #[error("script returned exit code {code}")]
    NonZeroExit { code: i32, output: Option<String> },

    /// The controller is shutting down; the operation's record is kept for a later resume.
    #[error("suspended: {0}")]
    Suspended(String),

    #[error("io error: {0}")]
    Io(String),

    /// An unexpected collaborator failure; never retried.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResolveError {
    /// Returns `true` for kinds a poll loop retries silently.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::Unreachable(_) | ResolveError::NotReady(_))
    }

    /// Short stable label (snake_case) for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolveError::Unreachable(_) => "unreachable",
            ResolveError::NotReady(_) => "not_ready",
            ResolveError::Refused(_) => "refused",
            ResolveError::Canceled(_) => "canceled",
            ResolveError::Invariant(_) => "invariant_violation",
            ResolveError::MissingWorkspace { .. } => "missing_workspace",
            ResolveError::NonZeroExit { .. } => "nonzero_exit",
            ResolveError::Suspended(_) => "suspended",
            ResolveError::Io(_) => "io",
            ResolveError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        ResolveError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("timer service is shut down")]
    Shutdown,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("invalid record key: {0:?}")]
    InvalidKey(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}
