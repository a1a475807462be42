//! Real `sh` scripts under supervision (unix, feature `shell`).
use std::{sync::Arc, time::Duration};

use dura_core::{
    PollContext,
    error::ResolveError,
    store::{FileRecordStore, RecordStore},
    timer::Timer,
};
use dura_exec::{
    BufferSink, Supervisor,
    shell::{LocalConnectivity, ShellController, ShellScript},
};
use dura_model::{Env, PollPolicy, StepOptions, StepValue, StopPolicy, WorkerId};

const DEADLINE: Duration = Duration::from_secs(20);

fn fast() -> PollPolicy {
    PollPolicy {
        min_ms: 20,
        max_ms: 200,
        ..PollPolicy::default()
    }
}

struct Fixture {
    root: tempfile::TempDir,
    conn: Arc<LocalConnectivity>,
    sink: Arc<BufferSink>,
    store: Arc<FileRecordStore>,
}

fn setup() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("job")).unwrap();
    let conn = Arc::new(LocalConnectivity::new().with_worker("local", root.path()));
    let store = Arc::new(FileRecordStore::open(root.path().join("records")).unwrap());
    Fixture {
        root,
        conn,
        sink: Arc::new(BufferSink::new()),
        store,
    }
}

impl Fixture {
    fn supervisor(&self, timer: Timer) -> Supervisor {
        let ctx = PollContext::new(timer).with_store(self.store.clone());
        Supervisor::new(ctx, self.conn.clone(), self.sink.clone())
            .with_poll_policy(fast())
            .with_stop_policy(StopPolicy { grace_ms: 5_000 })
    }

    fn job_dir(&self) -> std::path::PathBuf {
        self.root.path().join("job")
    }
}

#[tokio::test]
async fn captures_stdout_and_streams_stderr() {
    let env = setup();
    let sup = env.supervisor(Timer::current().unwrap());
    let script = ShellScript::new("echo hello\necho from-stderr 1>&2\n");

    let exec = sup
        .launch(
            "cap",
            &script,
            &Env::new(),
            WorkerId::new("local"),
            "/job",
            StepOptions::capture("UTF-8"),
        )
        .await
        .unwrap();

    let result = tokio::time::timeout(DEADLINE, exec.wait()).await.unwrap();
    assert_eq!(result, Ok(StepValue::Output("hello\n".into())));
    assert!(env.sink.contents().contains("from-stderr"));

    let leftovers: Vec<_> = std::fs::read_dir(env.job_dir()).unwrap().collect();
    assert!(leftovers.is_empty(), "control directory must be cleaned up");
    assert!(env.store.keys().unwrap().is_empty());
}

#[tokio::test]
async fn environment_reaches_the_script_and_exit_code_is_reported() {
    let env = setup();
    let sup = env.supervisor(Timer::current().unwrap());
    let script = ShellScript::new("echo \"greeting=$GREETING\"\nexit 3\n");

    let exec = sup
        .launch(
            "env",
            &script,
            &Env::new().with("GREETING", "hi"),
            WorkerId::new("local"),
            "job",
            StepOptions::exit_code(),
        )
        .await
        .unwrap();

    let result = tokio::time::timeout(DEADLINE, exec.wait()).await.unwrap();
    assert_eq!(result, Ok(StepValue::ExitCode(3)));
    assert!(env.sink.contents().contains("greeting=hi"));
}

#[tokio::test]
async fn stop_interrupts_a_long_running_script() {
    let env = setup();
    let sup = env.supervisor(Timer::current().unwrap());
    let script = ShellScript::new("echo started\nsleep 30\n");

    let exec = sup
        .launch(
            "stop",
            &script,
            &Env::new(),
            WorkerId::new("local"),
            "/job",
            StepOptions::default(),
        )
        .await
        .unwrap();
    let handle = exec.handle();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.status().await.contains("running"));
    handle.stop("aborted by user");

    let result = tokio::time::timeout(DEADLINE, exec.wait()).await.unwrap();
    assert!(
        matches!(result, Err(ResolveError::NonZeroExit { code, .. }) if code == -1 || code == 143),
        "unexpected {result:?}"
    );
    assert!(env.sink.contents().contains("Sending interrupt signal to process"));
}

#[tokio::test]
async fn resumed_supervisor_picks_up_a_running_script() {
    let env = setup();
    let first = Timer::current().unwrap();
    let script = ShellScript::new("echo before\nsleep 1\necho after\n");

    let exec = env
        .supervisor(first.clone())
        .launch(
            "resume",
            &script,
            &Env::new(),
            WorkerId::new("local"),
            "/job",
            StepOptions::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    first.shutdown();
    assert!(matches!(exec.wait().await, Err(ResolveError::Suspended(_))));

    let sup = env.supervisor(Timer::current().unwrap());
    let record = sup
        .load::<ShellController>("resume")
        .unwrap()
        .expect("record survives shutdown");
    assert_eq!(record.worker_id, WorkerId::new("local"));

    let exec = sup.resume("resume", record).unwrap();
    let result = tokio::time::timeout(DEADLINE, exec.wait()).await.unwrap();
    assert_eq!(result, Ok(StepValue::Empty));

    let log = env.sink.contents();
    assert_eq!(log.matches("before").count(), 1);
    assert!(log.contains("after"));
    assert!(env.store.keys().unwrap().is_empty());
}
