pub mod error;
pub mod metrics;
pub mod poller;
pub mod resolver;
pub mod slot;
pub mod store;
pub mod timer;

mod context;
pub use context::PollContext;

pub mod prelude {
    pub use crate::PollContext;
    pub use crate::error::{CoreError, ResolveError};
    pub use crate::metrics::{MetricsBackend, MetricsHandle, OperationOutcome};
    pub use crate::poller::{Attempt, Backoff, Outcome, PollControl, PollError, PollHandle, Poller};
    pub use crate::resolver::{Resolution, Resolve, ResolverHandle, ResumableResolver};
    pub use crate::slot::{ItemView, Scheduler, SlotRehydrator, StartState};
    pub use crate::store::{FileRecordStore, MemoryRecordStore, RecordStore, StoreHandle};
    pub use crate::timer::{Scheduled, Timer};
}
