use std::path::{Path, PathBuf};

use async_trait::async_trait;

use dura_model::WorkerId;

use crate::ExecError;

/// Live handle to a workspace directory on a reachable worker.
///
/// Never persisted: it is re-derived from `(worker_id, remote_path)` through [`Connectivity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    worker: WorkerId,
    path: PathBuf,
}

impl Workspace {
    pub fn new(worker: WorkerId, path: impl Into<PathBuf>) -> Self {
        Self {
            worker,
            path: path.into(),
        }
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Path through which this controller reaches the workspace.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Maps a durable worker identifier plus path to a live workspace.
#[async_trait]
pub trait Connectivity: Send + Sync + 'static {
    /// `Ok(None)` means the worker is currently unreachable; that is not an error.
    async fn resolve(&self, worker: &WorkerId, path: &str) -> Result<Option<Workspace>, ExecError>;

    /// Whether the workspace is still an existing directory.
    ///
    /// An error means the worker could not be asked; callers drop the workspace and reconnect.
    async fn is_directory(&self, ws: &Workspace) -> Result<bool, ExecError>;
}
