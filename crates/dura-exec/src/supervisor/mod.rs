//! # Process supervisor
//!
//! Monitors one external task until it reaches a terminal outcome, surviving controller
//! restarts through its `DurableOperationRecord`.
//!
//! ```text
//! launch ─► Polling ──(exit status)──────────────────────────► Succeeded | Failed
//!              │                                                   ▲
//!              └─ stop(cause) ─► Stopping ──(exit before grace)────┘
//!                    │                └──(grace expired)─► Failed(Canceled(cause))
//!                    └─(worker unreachable)──────────────► Failed(Canceled(cause))
//! resume(record) ─► Polling at the minimum interval
//! ```
//!
//! Every cycle resolves the workspace from `(workerId, remotePath)`; an unreachable worker
//! skips the cycle. Cleanup runs exactly once after the task's own terminal state was
//! observed.
mod run;
mod state;
pub use state::Phase;

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, info, info_span, warn};

use dura_core::{
    PollContext,
    error::ResolveError,
    store::{load_record, save_record},
};
use dura_model::{
    DurableOperationRecord, Env, PollPolicy, StepOptions, StepValue, StopPolicy, WorkerId,
};

use crate::{
    Connectivity, DurableTask, ExecError, SinkHandle, TaskController, Workspace,
    supervisor::{
        run::{Actor, Command, Delivery, Progress},
        state::PollState,
    },
};

/// Launches and resumes supervised tasks.
#[derive(Clone)]
pub struct Supervisor {
    ctx: PollContext,
    connectivity: Arc<dyn Connectivity>,
    sink: SinkHandle,
    poll: PollPolicy,
    stop: StopPolicy,
}

impl Supervisor {
    pub fn new(ctx: PollContext, connectivity: Arc<dyn Connectivity>, sink: SinkHandle) -> Self {
        Self {
            ctx,
            connectivity,
            sink,
            poll: PollPolicy::default(),
            stop: StopPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_stop_policy(mut self, stop: StopPolicy) -> Self {
        self.stop = stop;
        self
    }

    /// Launch `task` on `path` of `worker` and start supervising it under `key`.
    ///
    /// The worker must be reachable at launch time. The record is saved before the first
    /// check cycle when the context carries a store.
    pub async fn launch<T: DurableTask>(
        &self,
        key: impl Into<String>,
        task: &T,
        env: &Env,
        worker: WorkerId,
        path: impl Into<String>,
        options: StepOptions,
    ) -> Result<Execution<T::Controller>, ExecError> {
        let key = key.into();
        let path = path.into();
        options.validate()?;
        self.poll.validate()?;
        for w in options.warnings() {
            warn!(%key, "{w}");
        }

        let ws = self
            .connectivity
            .resolve(&worker, &path)
            .await?
            .ok_or_else(|| ExecError::Unreachable(worker.to_string()))?;

        let controller = task
            .launch(env, &ws, options.capture_output, self.sink.as_ref())
            .await?;
        let record = DurableOperationRecord::new(worker, path, controller, options);
        if let Some(store) = self.ctx.store() {
            save_record(store.as_ref(), &key, &record)?;
        }

        info!(%key, worker = %record.worker_id, path = %record.remote_path, "task launched");
        self.spawn(key, record, Some(ws))
    }

    /// Re-enter polling from a persisted record; launch is never repeated.
    pub fn resume<C: TaskController>(
        &self,
        key: impl Into<String>,
        record: DurableOperationRecord<C>,
    ) -> Result<Execution<C>, ExecError> {
        let key = key.into();
        self.poll.validate()?;
        info!(%key, worker = %record.worker_id, path = %record.remote_path, "resuming supervision");
        self.spawn(key, record, None)
    }

    /// Load a persisted record from the context's store.
    pub fn load<C: TaskController>(
        &self,
        key: &str,
    ) -> Result<Option<DurableOperationRecord<C>>, ExecError> {
        match self.ctx.store() {
            Some(store) => Ok(load_record(store.as_ref(), key)?),
            None => Ok(None),
        }
    }

    fn spawn<C: TaskController>(
        &self,
        key: String,
        record: DurableOperationRecord<C>,
        ws: Option<Workspace>,
    ) -> Result<Execution<C>, ExecError> {
        let state = PollState::derive(&self.poll);
        let first_delay = state.backoff.current();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(Progress {
            record: record.clone(),
            phase: state.phase(),
            interval_ms: state.backoff.current_ms(),
        });
        let (done_tx, done_rx) = oneshot::channel();

        let span = info_span!("supervise", key = %key, worker = %record.worker_id);
        let handle = ExecutionHandle {
            key: Arc::from(key.as_str()),
            commands: cmd_tx.clone(),
            progress: progress_rx,
        };
        let actor = Actor {
            key,
            record,
            ws,
            state,
            poll: self.poll.clone(),
            stop: self.stop.clone(),
            ctx: self.ctx.clone(),
            connectivity: Arc::clone(&self.connectivity),
            sink: Arc::clone(&self.sink),
            commands: cmd_tx,
            progress: progress_tx,
        };

        self.ctx.timer().spawn(
            async move {
                let result = actor.run(cmd_rx, first_delay).await;
                let _ = done_tx.send(result);
            }
            .instrument(span),
        )?;

        Ok(Execution {
            handle,
            rx: done_rx,
        })
    }
}

/// Clonable control surface of one supervised task.
#[derive(Clone)]
pub struct ExecutionHandle<C> {
    key: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    progress: watch::Receiver<Progress<C>>,
}

impl<C: TaskController> ExecutionHandle<C> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Request a stop with `cause`.
    ///
    /// Repeated requests are ignored; returns `false` once supervision has ended.
    pub fn stop(&self, cause: impl Into<String>) -> bool {
        self.commands.send(Command::Stop(cause.into())).is_ok()
    }

    /// Human-readable status; asks the worker for diagnostics when it is reachable.
    pub async fn status(&self) -> String {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Status(tx)).is_err() {
            return self.phase().to_string();
        }
        rx.await.unwrap_or_else(|_| self.phase().to_string())
    }

    /// Latest persisted-state snapshot.
    pub fn record(&self) -> DurableOperationRecord<C> {
        self.progress.borrow().record.clone()
    }

    pub fn phase(&self) -> Phase {
        self.progress.borrow().phase
    }

    /// Current recurrence period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.progress.borrow().interval_ms)
    }

    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}

/// A supervised task: its handle plus the single-use outcome.
pub struct Execution<C> {
    handle: ExecutionHandle<C>,
    rx: oneshot::Receiver<Delivery>,
}

impl<C: TaskController> Execution<C> {
    pub fn handle(&self) -> ExecutionHandle<C> {
        self.handle.clone()
    }

    /// Wait for the terminal outcome.
    ///
    /// [`ResolveError::Suspended`] means the controller shut down first; the record is still
    /// in the store and can be resumed.
    pub async fn wait(self) -> Result<StepValue, ResolveError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(ResolveError::Suspended("controller shutting down".into())))
    }
}
