//! Local shell-script tasks.
//!
//! A script is launched detached, in its own process group, through a small `sh` wrapper that
//! keeps all of its state in a control directory inside the workspace:
//!
//! ```text
//! <workspace>/.dura-<id>/
//!   script.sh   the user script
//!   pid         wrapper pid (= process group id)
//!   log         stdout+stderr, or stderr only when output is captured
//!   output      captured stdout
//!   result      exit code, written atomically once the script ends
//! ```
//!
//! Nothing ties the task to the controller process, so a restarted controller picks it up
//! again from the persisted [`ShellController`].
mod connectivity;
pub use connectivity::LocalConnectivity;

mod controller;
pub use controller::ShellController;

mod id;

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use dura_model::Env;

use crate::{DurableTask, ExecError, LogSink, Workspace};

pub(crate) const SCRIPT: &str = "script.sh";
pub(crate) const PID: &str = "pid";
pub(crate) const LOG: &str = "log";
pub(crate) const OUTPUT: &str = "output";
pub(crate) const RESULT: &str = "result";

/// Wrapper run as `sh -c WRAPPER dura-wrapper <dir>` from the workspace; `$1` is the control
/// directory.
const WRAPPER: &str = r#"sh "$1/script.sh" > "$1/log" 2>&1
echo $? > "$1/result.tmp" && mv "$1/result.tmp" "$1/result""#;

const WRAPPER_CAPTURE: &str = r#"sh "$1/script.sh" > "$1/output" 2> "$1/log"
echo $? > "$1/result.tmp" && mv "$1/result.tmp" "$1/result""#;

/// A `sh` script to run in the workspace.
#[derive(Debug, Clone)]
pub struct ShellScript {
    script: String,
}

impl ShellScript {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.script.trim().is_empty() {
            return Err(ExecError::Launch("script is empty".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableTask for ShellScript {
    type Controller = ShellController;

    async fn launch(
        &self,
        env: &Env,
        ws: &Workspace,
        capture_output: bool,
        _sink: &dyn LogSink,
    ) -> Result<ShellController, ExecError> {
        self.validate()?;

        let name = format!(".dura-{}", id::make_control_id());
        let dir = ws.path().join(&name);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(SCRIPT), &self.script).await?;

        trace!(dir = %dir.display(), capture_output, env_len = env.len(), "spawning shell wrapper");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(if capture_output { WRAPPER_CAPTURE } else { WRAPPER })
            .arg("dura-wrapper")
            .arg(&dir)
            .current_dir(ws.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        for kv in env.iter() {
            cmd.env(kv.key(), kv.value());
        }

        let child = cmd
            .spawn()
            .map_err(|e| ExecError::Launch(format!("spawn failed: {e}")))?;
        let pid = child
            .id()
            .ok_or_else(|| ExecError::Launch("wrapper exited before its pid was known".into()))?;
        tokio::fs::write(dir.join(PID), pid.to_string()).await?;

        debug!(pid, dir = %dir.display(), "shell task launched");
        Ok(ShellController::new(name, capture_output))
    }
}
