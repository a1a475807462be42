//! dura-agentd: runs shell steps on a local worker and keeps them alive across agent restarts.
//!
//! `run` launches a script and supervises it; `resume` picks up every step checkpointed by a
//! previous agent process. The first Ctrl-C stops the steps (interrupt, then grace period);
//! a second one suspends supervision and leaves the checkpoints for a later `resume`.
use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use dura_core::{
    PollContext,
    error::ResolveError,
    store::{FileRecordStore, RecordStore, StoreHandle, load_record},
    timer::Timer,
};
use dura_exec::{
    Execution, Supervisor, TracingSink,
    shell::{LocalConnectivity, ShellController, ShellScript},
};
use dura_model::{DurableOperationRecord, Env, KeyValue, StepOptions, StepValue, WorkerId};
use dura_observe::{LoggerTimeZone, init_local_offset, init_logger};
use dura_prometheus::PrometheusMetrics;

mod config;
use config::AgentConfig;

type ShellExecution = Execution<ShellController>;

#[derive(Parser)]
#[command(name = "dura-agentd", version)]
#[command(about = "Run shell steps that survive agent restarts", long_about = None)]
struct Cli {
    /// JSON config file; every field is optional
    #[arg(long, short, env = "DURA_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stdout before exiting
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a shell script and supervise it until it finishes
    Run {
        /// Checkpoint key for this step
        #[arg(long)]
        key: String,

        /// Worker to run on (defaults to the configured worker)
        #[arg(long)]
        worker: Option<String>,

        /// Workspace path on the worker
        #[arg(long, default_value = "/")]
        path: String,

        /// Return stdout as the step result instead of logging it
        #[arg(long)]
        capture: bool,

        /// Charset of the captured output
        #[arg(long, default_value = "UTF-8")]
        encoding: String,

        /// Report the exit code instead of failing on a non-zero one
        #[arg(long)]
        exit_code: bool,

        /// Extra environment variable, KEY=VALUE (repeatable)
        #[arg(long = "env", value_parser = parse_env)]
        env: Vec<KeyValue>,

        /// Script passed to `sh`
        script: String,
    },

    /// Resume checkpointed steps (all of them when no key is given)
    Resume { keys: Vec<String> },

    /// List checkpointed steps
    List,
}

fn parse_env(raw: &str) -> Result<KeyValue, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(KeyValue::new(key, value)),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = AgentConfig::load(cli.config.as_deref())?;

    // Must happen while the process is still single-threaded.
    if cfg.logger.tz == LoggerTimeZone::Local {
        init_local_offset();
    }
    init_logger(&cfg.logger)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(agent(cli, cfg))
}

async fn agent(cli: Cli, cfg: AgentConfig) -> Result<()> {
    let store: StoreHandle = Arc::new(
        FileRecordStore::open(&cfg.store_dir)
            .with_context(|| format!("opening store {}", cfg.store_dir.display()))?,
    );

    let metrics = PrometheusMetrics::new()?;
    let timer = Timer::current()?;
    let ctx = PollContext::new(timer.clone())
        .with_store(Arc::clone(&store))
        .with_metrics(Arc::new(metrics.clone()));
    let connectivity =
        Arc::new(LocalConnectivity::new().with_worker(cfg.worker_id(), cfg.worker_root.clone()));
    let supervisor = Supervisor::new(ctx, connectivity, Arc::new(TracingSink::new(cfg.log_config())))
        .with_poll_policy(cfg.poll.clone())
        .with_stop_policy(cfg.stop.clone());
    info!(store = %cfg.store_dir.display(), worker = %cfg.worker, "agent started");

    let executions = match cli.command {
        Command::List => return list(store.as_ref()),
        Command::Run {
            key,
            worker,
            path,
            capture,
            encoding,
            exit_code,
            env,
            script,
        } => {
            let options = StepOptions {
                capture_output: capture,
                output_encoding: encoding,
                report_exit_code: exit_code,
            };
            let worker = worker.map(WorkerId::from).unwrap_or_else(|| cfg.worker_id());
            let env = cfg.step_env(&env.into_iter().collect::<Env>());
            let execution = supervisor
                .launch(key.as_str(), &ShellScript::new(script), &env, worker, path, options)
                .await
                .with_context(|| format!("launching {key}"))?;
            vec![(key, execution)]
        }
        Command::Resume { keys } => resume(&supervisor, store.as_ref(), keys)?,
    };

    let failed = supervise(executions, &timer).await;
    if cli.metrics {
        print!("{}", metrics.encode_text()?);
    }
    if failed > 0 {
        bail!("{failed} step(s) did not succeed");
    }
    Ok(())
}

fn resume(
    supervisor: &Supervisor,
    store: &dyn RecordStore,
    keys: Vec<String>,
) -> Result<Vec<(String, ShellExecution)>> {
    let keys = if keys.is_empty() { store.keys()? } else { keys };
    let mut executions = Vec::with_capacity(keys.len());

    for key in keys {
        match supervisor.load::<ShellController>(&key) {
            Ok(Some(record)) => {
                let execution = supervisor.resume(key.as_str(), record)?;
                executions.push((key, execution));
            }
            Ok(None) => warn!(%key, "no checkpoint under this key"),
            Err(e) => warn!(%key, error = %e, "skipping unreadable checkpoint"),
        }
    }
    if executions.is_empty() {
        info!("nothing to resume");
    }
    Ok(executions)
}

fn list(store: &dyn RecordStore) -> Result<()> {
    for key in store.keys()? {
        match load_record::<DurableOperationRecord<ShellController>>(store, &key) {
            Ok(Some(record)) => println!(
                "{key}\t{}\t{}\t{}\toffset={}",
                record.worker_id,
                record.remote_path,
                record.controller_state.control_dir(),
                record.controller_state.log_offset(),
            ),
            Ok(None) => {}
            Err(e) => println!("{key}\t<unreadable: {e}>"),
        }
    }
    Ok(())
}

/// Waits for every execution; returns how many did not succeed.
async fn supervise(executions: Vec<(String, ShellExecution)>, timer: &Timer) -> usize {
    let handles: Vec<_> = executions.iter().map(|(_, e)| e.handle()).collect();
    let mut pending = JoinSet::new();
    for (key, execution) in executions {
        pending.spawn(async move { (key, execution.wait().await) });
    }

    let mut interrupted = false;
    let mut failed = 0;
    loop {
        tokio::select! {
            joined = pending.join_next() => {
                let Some(joined) = joined else { break };
                match joined {
                    Ok((key, Ok(value))) => report(&key, value),
                    Ok((key, Err(ResolveError::Suspended(reason)))) => {
                        info!(%key, %reason, "step suspended; checkpoint kept for resume");
                    }
                    Ok((key, Err(e))) => {
                        failed += 1;
                        error!(%key, error = %e, "step did not succeed");
                    }
                    Err(e) => {
                        failed += 1;
                        error!(error = %e, "supervision task aborted");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    warn!("second interrupt: suspending supervision");
                    timer.shutdown();
                } else {
                    interrupted = true;
                    info!(steps = handles.len(), "interrupt: stopping steps (again to suspend)");
                    for handle in handles.iter().filter(|h| !h.is_finished()) {
                        handle.stop("interrupted by operator");
                    }
                }
            }
        }
    }
    failed
}

fn report(key: &str, value: StepValue) {
    match value {
        StepValue::Empty => info!(%key, "step succeeded"),
        StepValue::ExitCode(code) => info!(%key, code, "step finished"),
        StepValue::Output(text) => {
            info!(%key, bytes = text.len(), "step succeeded");
            print!("{text}");
        }
    }
}
