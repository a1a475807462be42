use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid poll policy: {0}")]
    InvalidPolicy(String),

    #[error("unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("conflicting step options: {0}")]
    ConflictingOptions(String),

    #[error("submission already recorded as {0}")]
    AlreadySubmitted(u64),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
