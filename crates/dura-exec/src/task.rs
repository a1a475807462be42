use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use dura_model::Env;

use crate::{ExecError, LogSink, Workspace};

/// Restart-survivable handle on one launched external task.
///
/// The controller is the opaque `controllerState` of a `DurableOperationRecord`: it is
/// serialized after every cycle that advanced it and deserialized on resume. All live access
/// goes through a freshly resolved [`Workspace`].
#[async_trait]
pub trait TaskController: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Copy any new output into `sink`; `true` if there was some.
    async fn poll_output(&mut self, ws: &Workspace, sink: &dyn LogSink) -> Result<bool, ExecError>;

    /// `None` while the task is still running.
    async fn exit_status(&self, ws: &Workspace) -> Result<Option<i32>, ExecError>;

    /// Captured standard output (only meaningful when capture was requested at launch).
    async fn output(&self, ws: &Workspace) -> Result<Vec<u8>, ExecError>;

    /// Ask the task to terminate.
    async fn stop(&self, ws: &Workspace) -> Result<(), ExecError>;

    /// Remove whatever the launch left behind.
    async fn cleanup(&self, ws: &Workspace) -> Result<(), ExecError>;

    /// Free-form description for status output.
    async fn diagnostics(&self, ws: &Workspace) -> Result<String, ExecError>;
}

/// Something that can be launched on a workspace and then supervised.
#[async_trait]
pub trait DurableTask: Send + Sync {
    type Controller: TaskController;

    async fn launch(
        &self,
        env: &Env,
        ws: &Workspace,
        capture_output: bool,
        sink: &dyn LogSink,
    ) -> Result<Self::Controller, ExecError>;
}
