use thiserror::Error;

use dura_core::error::{CoreError, ResolveError};
use dura_model::ModelError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid step options: {0}")]
    Options(#[from] ModelError),

    #[error("worker {0} is not reachable")]
    Unreachable(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("task controller error: {0}")]
    Controller(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExecError> for ResolveError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Unreachable(w) => ResolveError::Unreachable(w),
            ExecError::Launch(msg) => ResolveError::Refused(msg),
            ExecError::Io(e) => ResolveError::Io(e.to_string()),
            other => ResolveError::Internal(other.to_string()),
        }
    }
}
