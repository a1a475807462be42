mod operation;
pub use operation::DurableOperationRecord;

mod submission;
pub use submission::PendingSubmission;
