//! The per-task check loop.
//!
//! One actor owns the record, the cached workspace and the derived [`PollState`]; stop and
//! status requests arrive as [`Command`]s, so check cycles, stop handling and status reads
//! never overlap and no lock is needed.
use std::{fmt::Write as _, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{debug, info, trace, warn};

use dura_core::{
    PollContext,
    error::ResolveError,
    metrics::{OperationOutcome, kind},
    store::save_record,
};
use dura_model::{DurableOperationRecord, PollPolicy, StepValue, StopPolicy};

use crate::{
    Connectivity, ExecError, SinkHandle, TaskController, Workspace,
    supervisor::state::{PendingStop, Phase, PollState},
};

pub(crate) type Delivery = Result<StepValue, ResolveError>;

pub(crate) enum Command {
    Stop(String),
    Status(oneshot::Sender<String>),
    GraceExpired,
}

/// What handles can observe without talking to the actor.
#[derive(Debug, Clone)]
pub(crate) struct Progress<C> {
    pub(crate) record: DurableOperationRecord<C>,
    pub(crate) phase: Phase,
    pub(crate) interval_ms: u64,
}

pub(crate) struct Actor<C: TaskController> {
    pub(crate) key: String,
    pub(crate) record: DurableOperationRecord<C>,
    pub(crate) ws: Option<Workspace>,
    pub(crate) state: PollState,
    pub(crate) poll: PollPolicy,
    pub(crate) stop: StopPolicy,
    pub(crate) ctx: PollContext,
    pub(crate) connectivity: Arc<dyn Connectivity>,
    pub(crate) sink: SinkHandle,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) progress: watch::Sender<Progress<C>>,
}

impl<C: TaskController> Actor<C> {
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        first_delay: Duration,
    ) -> Delivery {
        let started = Instant::now();
        let shutdown = self.ctx.timer().child_token();
        let mut next = Instant::now() + first_delay;

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    break Err(ResolveError::Suspended("controller shutting down".into()));
                }
                Some(cmd) = rx.recv() => {
                    let done = match cmd {
                        Command::Stop(cause) => self.on_stop(cause).await,
                        Command::Status(reply) => {
                            let _ = reply.send(self.status().await);
                            None
                        }
                        Command::GraceExpired => self.on_grace_expired(),
                    };
                    if let Some(result) = done {
                        break result;
                    }
                }
                _ = tokio::time::sleep_until(next) => {
                    if let Some(result) = self.check().await {
                        break result;
                    }
                    next = Instant::now() + self.state.backoff.current();
                    self.publish(self.state.phase());
                }
            }
        };
        self.finish(result, started)
    }

    /// One check cycle. `Some` once the task reached a terminal outcome.
    async fn check(&mut self) -> Option<Delivery> {
        self.ctx.metrics().record_attempt(kind::PROCESS);

        let ws = match self.workspace().await {
            Ok(Some(ws)) => ws,
            Ok(None) => {
                self.ctx
                    .metrics()
                    .record_transient(kind::PROCESS, "unreachable");
                return None;
            }
            Err(e) => return Some(Err(e)),
        };

        let limit = self.poll.attempt_timeout();
        match tokio::time::timeout(limit, self.cycle(&ws)).await {
            Ok(Ok(None)) => None,
            Ok(Ok(Some(delivery))) => {
                self.cleanup(&ws).await;
                Some(delivery)
            }
            Ok(Err(e)) => {
                debug!(error = %e, worker = %self.record.worker_id, "could not check workspace; reconnecting");
                self.ws = None;
                self.ctx
                    .metrics()
                    .record_transient(kind::PROCESS, "controller_error");
                None
            }
            Err(_) => {
                debug!(timeout = ?limit, worker = %self.record.worker_id, "check cycle timed out; reconnecting");
                self.ws = None;
                self.ctx.metrics().record_transient(kind::PROCESS, "timeout");
                None
            }
        }
    }

    async fn cycle(&mut self, ws: &Workspace) -> Result<Option<Delivery>, ExecError> {
        if self
            .record
            .controller_state
            .poll_output(ws, self.sink.as_ref())
            .await?
        {
            self.state.backoff.reset();
            self.checkpoint();
        } else {
            self.state.backoff.grow();
        }

        let Some(code) = self.record.controller_state.exit_status(ws).await? else {
            trace!(path = %self.record.remote_path, "still running");
            return Ok(None);
        };

        if self
            .record
            .controller_state
            .poll_output(ws, self.sink.as_ref())
            .await?
        {
            debug!(path = %self.record.remote_path, "last-minute output");
        }
        self.interpret(ws, code).await.map(Some)
    }

    async fn interpret(&self, ws: &Workspace, code: i32) -> Result<Delivery, ExecError> {
        let opts = &self.record.options;
        if opts.report_exit_code {
            return Ok(Ok(StepValue::ExitCode(code)));
        }

        let encoding = opts.encoding().unwrap_or_default();
        if code == 0 {
            if !opts.capture_output {
                return Ok(Ok(StepValue::Empty));
            }
            let out = self.record.controller_state.output(ws).await?;
            return Ok(Ok(StepValue::Output(encoding.decode(&out))));
        }

        let output = if opts.capture_output {
            let out = self.record.controller_state.output(ws).await?;
            self.sink.write(&out);
            Some(encoding.decode(&out))
        } else {
            None
        };
        Ok(Err(ResolveError::NonZeroExit { code, output }))
    }

    async fn cleanup(&self, ws: &Workspace) {
        let limit = self.poll.attempt_timeout();
        match tokio::time::timeout(limit, self.record.controller_state.cleanup(ws)).await {
            Ok(Ok(())) => trace!("controller cleaned up"),
            Ok(Err(e)) => warn!(error = %e, "controller cleanup failed"),
            Err(_) => warn!(timeout = ?limit, "controller cleanup timed out"),
        }
    }

    /// Cached workspace, re-resolved when missing and probed on every call.
    ///
    /// `Ok(None)` while the worker is unreachable; `Err` only when the worker answered and the
    /// workspace directory is gone.
    async fn workspace(&mut self) -> Result<Option<Workspace>, ResolveError> {
        let limit = self.poll.attempt_timeout();
        let worker = &self.record.worker_id;
        let remote = &self.record.remote_path;

        if self.ws.is_none() {
            match tokio::time::timeout(limit, self.connectivity.resolve(worker, remote)).await {
                Ok(Ok(Some(ws))) => self.ws = Some(ws),
                Ok(Ok(None)) => {
                    debug!(%worker, "worker is offline");
                    return Ok(None);
                }
                Ok(Err(e)) => {
                    debug!(%worker, error = %e, "cannot resolve workspace");
                    return Ok(None);
                }
                Err(_) => {
                    debug!(%worker, "workspace lookup timed out");
                    return Ok(None);
                }
            }
        }
        let Some(ws) = self.ws.clone() else {
            return Ok(None);
        };

        match tokio::time::timeout(limit, self.connectivity.is_directory(&ws)).await {
            Ok(Ok(true)) => Ok(Some(ws)),
            Ok(Ok(false)) => Err(ResolveError::MissingWorkspace {
                path: remote.clone(),
                worker: worker.to_string(),
            }),
            Ok(Err(e)) => {
                debug!(%worker, error = %e, "worker is evidently offline now");
                self.ws = None;
                Ok(None)
            }
            Err(_) => {
                debug!(%worker, "workspace probe timed out");
                self.ws = None;
                Ok(None)
            }
        }
    }

    async fn on_stop(&mut self, cause: String) -> Option<Delivery> {
        if self.state.stop.is_some() {
            debug!(%cause, "stop already requested");
            return None;
        }

        let ws = match self.workspace().await {
            Ok(Some(ws)) => ws,
            Ok(None) | Err(_) => {
                self.sink.println(&format!(
                    "Could not connect to {} to send interrupt signal to process",
                    self.record.worker_id
                ));
                return Some(Err(ResolveError::Canceled(cause)));
            }
        };

        self.sink.println("Sending interrupt signal to process");
        info!(%cause, "stopping process");

        let grace = self.stop.grace();
        let tx = self.commands.clone();
        let armed = self.ctx.timer().schedule(grace, async move {
            let _ = tx.send(Command::GraceExpired);
        });
        match armed {
            Ok(timer) => {
                self.state.stop = Some(PendingStop {
                    cause,
                    grace: timer,
                    deadline: Instant::now() + grace,
                });
            }
            Err(e) => {
                debug!(error = %e, "cannot arm grace timer");
                return Some(Err(ResolveError::Suspended(e.to_string())));
            }
        }
        self.publish(Phase::Stopping);

        let limit = self.poll.attempt_timeout();
        match tokio::time::timeout(limit, self.record.controller_state.stop(&ws)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to deliver interrupt"),
            Err(_) => warn!(timeout = ?limit, "interrupt delivery timed out"),
        }
        None
    }

    fn on_grace_expired(&mut self) -> Option<Delivery> {
        let stop = self.state.stop.take()?;
        let ms = self.stop.grace_ms;
        let waited = if ms % 1000 == 0 {
            format!("{}s", ms / 1000)
        } else {
            format!("{ms}ms")
        };
        self.sink
            .println(&format!("After {waited} process did not stop"));
        Some(Err(ResolveError::Canceled(stop.cause)))
    }

    async fn status(&mut self) -> String {
        let mut out = match self.workspace().await {
            Ok(Some(ws)) => {
                let limit = self.poll.attempt_timeout();
                match tokio::time::timeout(limit, self.record.controller_state.diagnostics(&ws))
                    .await
                {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => format!("failed to read diagnostics: {e}"),
                    Err(_) => "diagnostics timed out".to_string(),
                }
            }
            Ok(None) => format!(
                "waiting to reconnect to {} on {}",
                self.record.remote_path, self.record.worker_id
            ),
            Err(e) => format!("failed to look up workspace: {e}"),
        };

        let _ = write!(
            out,
            "; recurrence period: {}ms",
            self.state.backoff.current_ms()
        );
        if let Some(stop) = &self.state.stop {
            let left = stop.deadline.saturating_duration_since(Instant::now());
            let _ = write!(out, "; stop requested, grace expires in {}ms", left.as_millis());
        }
        out
    }

    fn checkpoint(&self) {
        let Some(store) = self.ctx.store() else {
            return;
        };
        match save_record(store.as_ref(), &self.key, &self.record) {
            Ok(()) => trace!(key = %self.key, "record saved"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to save record"),
        }
    }

    fn publish(&self, phase: Phase) {
        self.progress.send_replace(Progress {
            record: self.record.clone(),
            phase,
            interval_ms: self.state.backoff.current_ms(),
        });
    }

    fn finish(mut self, result: Delivery, started: Instant) -> Delivery {
        self.state.disarm();

        let phase = match &result {
            Ok(_) => Phase::Succeeded,
            Err(ResolveError::Suspended(_)) => Phase::Suspended,
            Err(_) => Phase::Failed,
        };

        if phase.is_terminal() {
            if let Some(store) = self.ctx.store() {
                if let Err(e) = store.remove(&self.key) {
                    warn!(key = %self.key, error = %e, "failed to remove record");
                }
            }
            let outcome = match &result {
                Ok(_) => OperationOutcome::Resolved,
                Err(e) => OperationOutcome::from_error(e),
            };
            self.ctx.metrics().record_outcome(
                kind::PROCESS,
                outcome,
                started.elapsed().as_millis() as u64,
            );
            match &result {
                Ok(value) => info!(?value, "task finished"),
                Err(e) => info!(error = %e, "task failed"),
            }
        } else {
            debug!(key = %self.key, "supervision suspended; record kept");
        }

        self.publish(phase);
        result
    }
}
