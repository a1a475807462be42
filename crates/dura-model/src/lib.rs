mod domain;
pub use domain::{Env, KeyValue, SubmissionId, TimeoutMs, WorkerId};

mod error;
pub use error::{ModelError, ModelResult};

mod policy;
pub use policy::{PollPolicy, StopPolicy};

mod record;
pub use record::{DurableOperationRecord, PendingSubmission};

mod step;
pub use step::{StepOptions, StepValue, TextEncoding};
