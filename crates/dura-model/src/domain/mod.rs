mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod worker;
pub use worker::WorkerId;

mod submission;
pub use submission::SubmissionId;

/// Duration value in milliseconds, as carried by persisted policies.
pub type TimeoutMs = u64;
