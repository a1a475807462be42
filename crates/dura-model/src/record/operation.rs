use serde::{Deserialize, Serialize};

use crate::{StepOptions, WorkerId};

/// Restart-survivable identity of one in-flight external task.
///
/// Holds only what is needed to re-derive a live connection: the worker name, the path on that
/// worker, and the task controller's own serialized state. `C` is owned by the task controller
/// and advances every poll cycle (for example, a log read offset).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableOperationRecord<C> {
    pub worker_id: WorkerId,
    pub remote_path: String,
    pub controller_state: C,
    #[serde(flatten)]
    pub options: StepOptions,
}

impl<C> DurableOperationRecord<C> {
    pub fn new(
        worker_id: WorkerId,
        remote_path: impl Into<String>,
        controller_state: C,
        options: StepOptions,
    ) -> Self {
        Self {
            worker_id,
            remote_path: remote_path.into(),
            controller_state,
            options,
        }
    }
}
