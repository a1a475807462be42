use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

use crate::{
    ExecError, LogSink, TaskController, Workspace,
    shell::{LOG, OUTPUT, PID, RESULT},
};

/// Upper bound on log bytes copied per cycle.
const MAX_CHUNK: u64 = 1 << 20;

/// Persisted handle on a launched shell script.
///
/// Only the control directory name and the log read offset are kept; everything else is read
/// back from the control directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellController {
    control_dir: String,
    log_offset: u64,
    capture_output: bool,
}

impl ShellController {
    pub(crate) fn new(control_dir: String, capture_output: bool) -> Self {
        Self {
            control_dir,
            log_offset: 0,
            capture_output,
        }
    }

    pub fn control_dir(&self) -> &str {
        &self.control_dir
    }

    pub fn log_offset(&self) -> u64 {
        self.log_offset
    }

    pub fn captures_output(&self) -> bool {
        self.capture_output
    }

    fn dir(&self, ws: &Workspace) -> PathBuf {
        ws.path().join(&self.control_dir)
    }

    async fn read_number(path: &Path) -> Result<Option<i32>, ExecError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => text.trim().parse().map(Some).map_err(|_| {
                ExecError::Controller(format!("malformed {}: {:?}", path.display(), text.trim()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn result(&self, ws: &Workspace) -> Result<Option<i32>, ExecError> {
        Self::read_number(&self.dir(ws).join(RESULT)).await
    }

    async fn pid(&self, ws: &Workspace) -> Result<Option<i32>, ExecError> {
        Self::read_number(&self.dir(ws).join(PID)).await
    }
}

#[async_trait]
impl TaskController for ShellController {
    async fn poll_output(&mut self, ws: &Workspace, sink: &dyn LogSink) -> Result<bool, ExecError> {
        let path = self.dir(ws).join(LOG);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.len() <= self.log_offset {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(self.log_offset)).await?;
        let mut buf = Vec::new();
        file.take(MAX_CHUNK).read_to_end(&mut buf).await?;
        if buf.is_empty() {
            return Ok(false);
        }

        sink.write(&buf);
        self.log_offset += buf.len() as u64;
        trace!(bytes = buf.len(), offset = self.log_offset, "copied task log");
        Ok(true)
    }

    async fn exit_status(&self, ws: &Workspace) -> Result<Option<i32>, ExecError> {
        if let Some(code) = self.result(ws).await? {
            return Ok(Some(code));
        }
        let Some(pid) = self.pid(ws).await? else {
            return Ok(None);
        };
        if process_alive(pid) {
            return Ok(None);
        }
        // the wrapper may have written its result right before exiting
        match self.result(ws).await? {
            Some(code) => Ok(Some(code)),
            None => {
                debug!(pid, "wrapper died without recording a result");
                Ok(Some(-1))
            }
        }
    }

    async fn output(&self, ws: &Workspace) -> Result<Vec<u8>, ExecError> {
        match tokio::fs::read(self.dir(ws).join(OUTPUT)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop(&self, ws: &Workspace) -> Result<(), ExecError> {
        let pid = self
            .pid(ws)
            .await?
            .ok_or_else(|| ExecError::Controller("no pid recorded".into()))?;
        // -0 and -1 would signal our own group or every process we may signal
        if pid <= 1 {
            return Err(ExecError::Controller(format!(
                "invalid pid {pid} in {}",
                self.dir(ws).display()
            )));
        }
        let rc = unsafe { libc::kill(-pid, libc::SIGTERM) };
        if rc == 0 {
            debug!(pid, "sent SIGTERM to process group");
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pid, "process group already gone");
            return Ok(());
        }
        Err(err.into())
    }

    async fn cleanup(&self, ws: &Workspace) -> Result<(), ExecError> {
        match tokio::fs::remove_dir_all(self.dir(ws)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn diagnostics(&self, ws: &Workspace) -> Result<String, ExecError> {
        let state = match self.result(ws).await? {
            Some(code) => format!("exited with {code}"),
            None => match self.pid(ws).await? {
                Some(pid) if process_alive(pid) => format!("pid {pid} running"),
                Some(pid) => format!("pid {pid} no longer running"),
                None => "not started".to_string(),
            },
        };
        Ok(format!(
            "{}: {state}; log offset {}",
            self.dir(ws).display(),
            self.log_offset
        ))
    }
}

/// `kill(pid, 0)` probe; zombies count as dead.
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    if rc != 0 {
        return io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    }
    !is_zombie(pid)
}

fn is_zombie(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferSink;
    use dura_model::WorkerId;

    fn setup() -> (tempfile::TempDir, Workspace, ShellController) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(WorkerId::new("local"), dir.path());
        std::fs::create_dir(dir.path().join(".dura-test")).unwrap();
        (dir, ws, ShellController::new(".dura-test".into(), false))
    }

    #[tokio::test]
    async fn poll_output_copies_only_new_bytes() {
        let (dir, ws, mut ctl) = setup();
        let sink = BufferSink::new();
        assert!(!ctl.poll_output(&ws, &sink).await.unwrap());

        let log = dir.path().join(".dura-test").join(LOG);
        std::fs::write(&log, b"one\n").unwrap();
        assert!(ctl.poll_output(&ws, &sink).await.unwrap());
        assert!(!ctl.poll_output(&ws, &sink).await.unwrap());

        std::fs::write(&log, b"one\ntwo\n").unwrap();
        assert!(ctl.poll_output(&ws, &sink).await.unwrap());
        assert_eq!(sink.contents(), "one\ntwo\n");
        assert_eq!(ctl.log_offset(), 8);
    }

    #[tokio::test]
    async fn exit_status_reads_result_or_detects_dead_wrapper() {
        let (dir, ws, ctl) = setup();
        let control = dir.path().join(".dura-test");
        assert_eq!(ctl.exit_status(&ws).await.unwrap(), None);

        std::fs::write(control.join(PID), "0").unwrap();
        assert_eq!(ctl.exit_status(&ws).await.unwrap(), Some(-1));

        std::fs::write(control.join(RESULT), "3\n").unwrap();
        assert_eq!(ctl.exit_status(&ws).await.unwrap(), Some(3));
        assert!(ctl.diagnostics(&ws).await.unwrap().ends_with("exited with 3; log offset 0"));

        ctl.cleanup(&ws).await.unwrap();
        assert!(!control.exists());
        ctl.cleanup(&ws).await.unwrap();
    }

    #[tokio::test]
    async fn stop_refuses_pids_that_would_signal_a_wider_group() {
        let (dir, ws, ctl) = setup();
        let control = dir.path().join(".dura-test");
        assert!(matches!(ctl.stop(&ws).await, Err(ExecError::Controller(_))));

        for pid in ["0", "1"] {
            std::fs::write(control.join(PID), pid).unwrap();
            let err = ctl.stop(&ws).await.unwrap_err();
            assert!(
                matches!(&err, ExecError::Controller(msg) if msg.starts_with(&format!("invalid pid {pid}"))),
                "{err:?}"
            );
        }
    }

    #[test]
    fn persisted_state_is_small() {
        let ctl = ShellController::new(".dura-1".into(), true);
        assert_eq!(
            serde_json::to_value(&ctl).unwrap(),
            serde_json::json!({"controlDir": ".dura-1", "logOffset": 0, "captureOutput": true})
        );
    }
}
