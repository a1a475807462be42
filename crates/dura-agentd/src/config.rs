use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use dura_exec::LogConfig;
use dura_model::{Env, PollPolicy, StopPolicy, WorkerId};
use dura_observe::LoggerConfig;

/// Agent configuration file. Every field is optional.
///
/// ```json
/// {
///   "storeDir": "/var/lib/dura",
///   "worker": "local",
///   "workerRoot": "/srv/jobs",
///   "poll": { "minMs": 250, "maxMs": 15000 },
///   "stop": { "graceMs": 10000 },
///   "env": [{ "key": "LANG", "value": "C.UTF-8" }],
///   "logger": { "format": "json", "level": "dura_exec=debug,info" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Directory of the checkpoint store.
    pub store_dir: PathBuf,
    /// Name of the local worker.
    pub worker: String,
    /// Directory that workspace paths of the local worker are resolved against.
    pub worker_root: PathBuf,
    pub poll: PollPolicy,
    pub stop: StopPolicy,
    /// Exported to every step before the `--env` entries of `run`.
    pub env: Env,
    pub logger: LoggerConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub max_line_length: usize,
    /// Task output at INFO (otherwise DEBUG).
    pub info: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("dura-records"),
            worker: "local".to_owned(),
            worker_root: PathBuf::from("."),
            poll: PollPolicy::default(),
            stop: StopPolicy::default(),
            env: Env::new(),
            logger: LoggerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let base = LogConfig::default();
        Self {
            max_line_length: base.max_line_length,
            info: base.output_info,
        }
    }
}

impl AgentConfig {
    /// Reads `path` (defaults when `None`), then applies the `DURA_LOG_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        cfg.with_env(|var| std::env::var(var).ok())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.logger = self.logger.overlay(lookup)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.worker.trim().is_empty(), "worker name must not be empty");
        ensure!(self.output.max_line_length > 0, "output.maxLineLength must be positive");
        self.poll.validate()?;
        Ok(())
    }

    pub fn worker_id(&self) -> WorkerId {
        WorkerId::from(self.worker.as_str())
    }

    /// Configured environment followed by `extra`.
    pub fn step_env(&self, extra: &Env) -> Env {
        self.env.merged(extra)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            max_line_length: self.output.max_line_length,
            output_info: self.output.info,
        }
    }
}
