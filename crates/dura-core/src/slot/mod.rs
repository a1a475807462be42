//! Slot rehydration: re-acquire an execution slot for previously queued work.
//!
//! The only persisted state is a [`PendingSubmission`]: the work spec plus the submission id
//! once the scheduler accepted it. Each attempt either submits (id unset) or looks the item up
//! by id, so resuming after a restart never submits twice.
mod scheduler;
pub use scheduler::{ItemView, Scheduler, StartState};

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use dura_model::{PendingSubmission, SubmissionId};

use crate::{error::ResolveError, metrics::kind, resolver::Resolve};

/// [`Resolve`] strategy that waits for a scheduled item to start and yields its handle.
pub struct SlotRehydrator<S: Scheduler> {
    scheduler: Arc<S>,
    state: Mutex<PendingSubmission<S::Work>>,
    missing_handle_retries: u32,
    missing_handle_seen: AtomicU32,
}

impl<S: Scheduler> SlotRehydrator<S> {
    /// Fresh rehydration; the work is submitted on the first attempt.
    pub fn new(scheduler: Arc<S>, work: S::Work) -> Self {
        Self::from_state(scheduler, PendingSubmission::new(work))
    }

    /// Rebuild from a persisted record.
    pub fn from_state(scheduler: Arc<S>, state: PendingSubmission<S::Work>) -> Self {
        Self {
            scheduler,
            state: Mutex::new(state),
            missing_handle_retries: 0,
            missing_handle_seen: AtomicU32::new(0),
        }
    }

    /// Tolerate up to `n` attempts that see a started item without a handle before failing.
    ///
    /// Default `0`: the first such observation is an invariant violation.
    pub fn with_missing_handle_retries(mut self, n: u32) -> Self {
        self.missing_handle_retries = n;
        self
    }

    pub fn submission_id(&self) -> SubmissionId {
        self.lock().submission_id
    }

    // Every critical section is a plain field read or a single `assign`, so a poisoned lock
    // still holds a consistent record.
    fn lock(&self) -> MutexGuard<'_, PendingSubmission<S::Work>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn work(&self) -> S::Work {
        self.lock().work_spec.clone()
    }

    async fn submit(&self) -> Result<SubmissionId, ResolveError> {
        let work = self.work();
        let Some(id) = self.scheduler.submit(&work).await? else {
            return Err(ResolveError::Refused(format!("scheduler refused {work}")));
        };
        if !id.is_assigned() {
            return Err(ResolveError::Invariant(format!(
                "scheduler accepted {work} with reserved id {id}"
            )));
        }
        self.lock()
            .assign(id)
            .map_err(|e| ResolveError::Invariant(format!("cannot record submission of {work}: {e}")))?;
        debug!(%work, submission = %id, "work scheduled");
        Ok(id)
    }
}

#[async_trait]
impl<S: Scheduler> Resolve for SlotRehydrator<S> {
    type Value = S::Handle;
    type State = PendingSubmission<S::Work>;

    fn kind(&self) -> &'static str {
        kind::SLOT
    }

    fn state(&self) -> Self::State {
        self.lock().clone()
    }

    async fn try_resolve(&self) -> Result<Option<S::Handle>, ResolveError> {
        let submitted = {
            let state = self.lock();
            state.is_submitted().then_some(state.submission_id)
        };
        let id = match submitted {
            Some(id) => id,
            None => self.submit().await?,
        };

        let Some(item) = self.scheduler.item(id).await? else {
            return Err(ResolveError::Invariant(format!("scheduler lost item {id}")));
        };

        match item.start {
            StartState::NotStarted => {
                trace!(submission = %id, blockage = ?item.blockage, "not yet started");
                Ok(None)
            }
            StartState::Canceled => Err(ResolveError::Canceled(format!(
                "scheduled item {id} was canceled"
            ))),
            StartState::Started(Some(handle)) => {
                debug!(submission = %id, "execution slot acquired");
                Ok(Some(handle))
            }
            StartState::Started(None) => {
                let seen = self.missing_handle_seen.fetch_add(1, Ordering::AcqRel);
                if seen < self.missing_handle_retries {
                    debug!(submission = %id, seen = seen + 1, "started without a handle; retrying");
                    return Ok(None);
                }
                let work = self.work();
                error!(submission = %id, %work, "item started but no execution handle claimed it");
                Err(ResolveError::Invariant(format!(
                    "{work} was scheduled but no execution handle claimed it"
                )))
            }
        }
    }

    async fn waiting_status(&self) -> String {
        let PendingSubmission {
            submission_id: id,
            work_spec: work,
        } = self.state();
        if !id.is_assigned() {
            return format!("Waiting to schedule {work}");
        }
        match self.scheduler.item(id).await {
            Ok(Some(ItemView {
                blockage: Some(cause),
                ..
            })) => format!("Waiting to resume {work}: {cause}"),
            Ok(Some(_)) => format!("Waiting to resume {work}"),
            Ok(None) => format!("Trying to locate scheduled item {id}"),
            Err(e) => format!("Waiting to resume {work} ({e})"),
        }
    }

    fn stalled_status(&self) -> String {
        format!("Waiting to resume {} (scheduler not responding)", self.work())
    }

    async fn release(&self) -> Result<(), ResolveError> {
        let id = self.submission_id();
        if !id.is_assigned() {
            debug!(work = %self.work(), "nothing submitted; nothing to cancel");
            return Ok(());
        }
        if self.scheduler.cancel(id).await? {
            debug!(submission = %id, "scheduled item canceled");
        } else {
            warn!(submission = %id, "scheduler failed to cancel item");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::PollContext,
        resolver::ResumableResolver,
        store::{MemoryRecordStore, RecordStore, load_record},
        timer::Timer,
    };
    use dura_model::PollPolicy;
    use std::{
        collections::VecDeque,
        sync::{Mutex, atomic::AtomicUsize},
        time::Duration,
    };

    /// Scheduler whose item lookups replay a script; the last entry repeats.
    #[derive(Default)]
    struct FakeScheduler {
        refuse: bool,
        script: Mutex<VecDeque<Option<ItemView<String>>>>,
        submits: AtomicUsize,
        cancels: Mutex<Vec<SubmissionId>>,
        cancel_fails: bool,
        cancel_hangs: bool,
        lookup_hangs: bool,
    }

    impl FakeScheduler {
        fn scripted(script: Vec<Option<ItemView<String>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            })
        }
    }

    fn view(start: StartState<String>) -> Option<ItemView<String>> {
        Some(ItemView {
            id: SubmissionId::new(41),
            start,
            blockage: None,
        })
    }

    #[async_trait]
    impl Scheduler for FakeScheduler {
        type Work = String;
        type Handle = String;

        async fn submit(&self, _: &String) -> Result<Option<SubmissionId>, ResolveError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok((!self.refuse).then_some(SubmissionId::new(41)))
        }

        async fn item(&self, _: SubmissionId) -> Result<Option<ItemView<String>>, ResolveError> {
            if self.lookup_hangs {
                std::future::pending::<()>().await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.pop_front().flatten())
            } else {
                Ok(script.front().cloned().flatten())
            }
        }

        async fn cancel(&self, id: SubmissionId) -> Result<bool, ResolveError> {
            self.cancels.lock().unwrap().push(id);
            if self.cancel_hangs {
                std::future::pending::<()>().await;
            }
            if self.cancel_fails {
                Err(ResolveError::Unreachable("scheduler offline".into()))
            } else {
                Ok(true)
            }
        }
    }

    fn ctx() -> PollContext {
        PollContext::new(Timer::current().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_fails_on_first_attempt_without_retry() {
        let scheduler = Arc::new(FakeScheduler {
            refuse: true,
            ..FakeScheduler::default()
        });
        let res = ResumableResolver::new(ctx(), SlotRehydrator::new(scheduler.clone(), "build".into()))
            .start()
            .unwrap();
        let handle = res.handle();

        assert_eq!(
            res.wait().await,
            Err(ResolveError::Refused("scheduler refused build".into()))
        );
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.attempts(), 1);
        assert_eq!(scheduler.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_item_fails_with_canceled() {
        let scheduler = FakeScheduler::scripted(vec![
            view(StartState::NotStarted),
            view(StartState::Canceled),
        ]);
        let res = ResumableResolver::new(ctx(), SlotRehydrator::new(scheduler, "build".into()))
            .start()
            .unwrap();

        assert!(matches!(res.wait().await, Err(ResolveError::Canceled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_id_is_queried_never_resubmitted() {
        let scheduler = FakeScheduler::scripted(vec![
            view(StartState::NotStarted),
            view(StartState::Started(Some("executor-3".into()))),
        ]);
        let mut state = PendingSubmission::new("build".to_string());
        state.assign(SubmissionId::new(41)).unwrap();

        let slot = SlotRehydrator::from_state(scheduler.clone(), state);
        assert_eq!(slot.try_resolve().await, Ok(None));
        assert_eq!(slot.try_resolve().await, Ok(Some("executor-3".into())));
        assert_eq!(scheduler.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_is_checkpointed_once_assigned() {
        let scheduler = FakeScheduler::scripted(vec![view(StartState::NotStarted)]);
        let store = Arc::new(MemoryRecordStore::new());
        let res = ResumableResolver::new(
            ctx().with_store(store.clone()),
            SlotRehydrator::new(scheduler.clone(), "build".into()),
        )
        .checkpoint("slot")
        .start()
        .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let saved: PendingSubmission<String> = load_record(store.as_ref(), "slot").unwrap().unwrap();
        assert_eq!(saved.submission_id, SubmissionId::new(41));
        assert_eq!(scheduler.submits.load(Ordering::SeqCst), 1);

        res.handle().cancel("abort");
        assert!(res.wait().await.is_err());
        assert_eq!(store.keys().unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn waiting_status_reports_blockage() {
        let scheduler = FakeScheduler::scripted(vec![Some(
            ItemView::queued(SubmissionId::new(41)).blocked("waiting for next available executor"),
        )]);
        let slot = SlotRehydrator::new(scheduler.clone(), "build".into());
        assert_eq!(slot.waiting_status().await, "Waiting to schedule build");

        slot.try_resolve().await.unwrap();
        assert_eq!(
            slot.waiting_status().await,
            "Waiting to resume build: waiting for next available executor"
        );

        let lost = SlotRehydrator::from_state(
            FakeScheduler::scripted(vec![None]),
            PendingSubmission {
                submission_id: SubmissionId::new(9),
                work_spec: "build".to_string(),
            },
        );
        assert_eq!(lost.waiting_status().await, "Trying to locate scheduled item #9");
        assert_eq!(
            lost.try_resolve().await,
            Err(ResolveError::Invariant("scheduler lost item #9".into()))
        );
    }

    #[tokio::test]
    async fn started_without_handle_is_an_invariant_violation() {
        let scheduler = FakeScheduler::scripted(vec![view(StartState::Started(None))]);
        let slot = SlotRehydrator::new(scheduler, "build".into());
        assert!(matches!(
            slot.try_resolve().await,
            Err(ResolveError::Invariant(_))
        ));
    }

    #[tokio::test]
    async fn missing_handle_retries_absorb_a_short_race() {
        let scheduler = FakeScheduler::scripted(vec![
            view(StartState::Started(None)),
            view(StartState::Started(Some("executor-1".into()))),
        ]);
        let slot = SlotRehydrator::new(scheduler, "build".into()).with_missing_handle_retries(1);
        assert_eq!(slot.try_resolve().await, Ok(None));
        assert_eq!(slot.try_resolve().await, Ok(Some("executor-1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_completes_even_if_scheduler_cancel_fails() {
        let scheduler = Arc::new(FakeScheduler {
            script: Mutex::new(vec![view(StartState::NotStarted)].into()),
            cancel_fails: true,
            ..FakeScheduler::default()
        });
        let res = ResumableResolver::new(ctx(), SlotRehydrator::new(scheduler.clone(), "build".into()))
            .start()
            .unwrap();
        let handle = res.handle();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel("user abort");
        handle.cancel("user abort again");

        assert_eq!(
            res.wait().await,
            Err(ResolveError::Canceled("user abort".into()))
        );
        assert_eq!(*scheduler.cancels.lock().unwrap(), vec![SubmissionId::new(41)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_completes_when_scheduler_cancel_never_returns() {
        let scheduler = Arc::new(FakeScheduler {
            script: Mutex::new(vec![view(StartState::NotStarted)].into()),
            cancel_hangs: true,
            ..FakeScheduler::default()
        });
        let res = ResumableResolver::new(ctx(), SlotRehydrator::new(scheduler.clone(), "build".into()))
            .start()
            .unwrap();
        let handle = res.handle();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel("user abort");
        let canceled_at = tokio::time::Instant::now();

        let result = tokio::time::timeout(Duration::from_secs(60), res.wait())
            .await
            .expect("cancellation must not wait on the scheduler forever");
        assert_eq!(result, Err(ResolveError::Canceled("user abort".into())));
        assert!(canceled_at.elapsed() <= PollPolicy::default().attempt_timeout());
        assert_eq!(*scheduler.cancels.lock().unwrap(), vec![SubmissionId::new(41)]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_answers_while_scheduler_lookup_hangs() {
        let scheduler = Arc::new(FakeScheduler {
            lookup_hangs: true,
            ..FakeScheduler::default()
        });
        let mut state = PendingSubmission::new("build".to_string());
        state.assign(SubmissionId::new(41)).unwrap();
        let res = ResumableResolver::new(ctx(), SlotRehydrator::from_state(scheduler, state))
            .resume()
            .unwrap();
        let handle = res.handle();

        let status = tokio::time::timeout(Duration::from_secs(60), handle.status())
            .await
            .expect("status must not wait on the scheduler forever");
        assert_eq!(status, "Waiting to resume build (scheduler not responding)");

        handle.cancel("done");
        assert_eq!(res.wait().await, Err(ResolveError::Canceled("done".into())));
    }

    #[tokio::test]
    async fn second_submission_is_rejected_by_the_record() {
        let scheduler = FakeScheduler::scripted(vec![view(StartState::NotStarted)]);
        let slot = SlotRehydrator::new(scheduler.clone(), "build".into());
        assert_eq!(slot.submit().await, Ok(SubmissionId::new(41)));

        assert!(matches!(slot.submit().await, Err(ResolveError::Invariant(_))));
        assert_eq!(slot.state().submission_id, SubmissionId::new(41));
    }
}
