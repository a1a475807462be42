use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::PathBuf,
    sync::RwLock,
};

use async_trait::async_trait;

use dura_model::WorkerId;

use crate::{Connectivity, ExecError, Workspace};

/// Workers backed by local directories.
///
/// A remote path is resolved relative to the worker's root. Workers can be marked offline to
/// simulate a lost connection.
#[derive(Debug, Default)]
pub struct LocalConnectivity {
    roots: RwLock<HashMap<WorkerId, PathBuf>>,
    offline: RwLock<HashSet<WorkerId>>,
}

impl LocalConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(self, worker: impl Into<WorkerId>, root: impl Into<PathBuf>) -> Self {
        self.add_worker(worker, root);
        self
    }

    pub fn add_worker(&self, worker: impl Into<WorkerId>, root: impl Into<PathBuf>) {
        if let Ok(mut roots) = self.roots.write() {
            roots.insert(worker.into(), root.into());
        }
    }

    pub fn set_offline(&self, worker: &WorkerId, offline: bool) {
        if let Ok(mut set) = self.offline.write() {
            if offline {
                set.insert(worker.clone());
            } else {
                set.remove(worker);
            }
        }
    }

    fn is_offline(&self, worker: &WorkerId) -> bool {
        self.offline
            .read()
            .map(|set| set.contains(worker))
            .unwrap_or(true)
    }
}

#[async_trait]
impl Connectivity for LocalConnectivity {
    async fn resolve(&self, worker: &WorkerId, path: &str) -> Result<Option<Workspace>, ExecError> {
        if self.is_offline(worker) {
            return Ok(None);
        }
        let root = self
            .roots
            .read()
            .map_err(|_| ExecError::Internal("worker table lock poisoned".into()))?
            .get(worker)
            .cloned();
        Ok(root.map(|root| Workspace::new(worker.clone(), root.join(path.trim_start_matches('/')))))
    }

    async fn is_directory(&self, ws: &Workspace) -> Result<bool, ExecError> {
        if self.is_offline(ws.worker()) {
            return Err(ExecError::Unreachable(ws.worker().to_string()));
        }
        match tokio::fs::metadata(ws.path()).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_relative_to_root_and_honours_offline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("job")).unwrap();
        let conn = LocalConnectivity::new().with_worker("w1", dir.path());
        let w1 = WorkerId::new("w1");

        let ws = conn.resolve(&w1, "/job").await.unwrap().unwrap();
        assert_eq!(ws.path(), dir.path().join("job"));
        assert!(conn.is_directory(&ws).await.unwrap());

        conn.set_offline(&w1, true);
        assert!(conn.resolve(&w1, "job").await.unwrap().is_none());
        assert!(conn.is_directory(&ws).await.is_err());

        conn.set_offline(&w1, false);
        let gone = conn.resolve(&w1, "missing").await.unwrap().unwrap();
        assert!(!conn.is_directory(&gone).await.unwrap());
        assert!(conn.resolve(&WorkerId::new("nobody"), "job").await.unwrap().is_none());
    }
}
