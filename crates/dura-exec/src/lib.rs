mod error;
pub use error::ExecError;

mod sink;
pub use sink::{BufferSink, LogConfig, LogSink, SinkHandle, TracingSink};

mod task;
pub use task::{DurableTask, TaskController};

mod workspace;
pub use workspace::{Connectivity, Workspace};

pub mod supervisor;
pub use supervisor::{Execution, ExecutionHandle, Phase, Supervisor};

#[cfg(all(unix, feature = "shell"))]
pub mod shell;
