#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use branchdag::dag::{RunPhase, Scheduler, TaskDef, TaskState, next_run_id};
use branchdag::engine::{CoreRuntime, RunOptions, Runtime, RuntimeEvent};
use branchdag::exec::RealExecutorBackend;
use branchdag::run_dag;
use branchdag::types::RunParams;
use branchdag_test_utils::{
    ConfigFileBuilder, DagBuilder, RecordingSink, ScriptedRunner, TaskConfigBuilder,
    init_tracing, with_timeout,
};

#[tokio::test]
async fn shell_commands_run_in_dependency_order() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");
    let log = log.display();

    let cfg = ConfigFileBuilder::new()
        .with_name("shell")
        .with_task("first", TaskConfigBuilder::cmd(&format!("echo first >> {log}")).build())
        .with_task(
            "second",
            TaskConfigBuilder::cmd(&format!("echo second >> {log}"))
                .after("first")
                .build(),
        )
        .build();

    let report = with_timeout(run_dag(&cfg, Arc::new(RecordingSink::new())))
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    let written = std::fs::read_to_string(dir.path().join("order.log")).unwrap();
    assert_eq!(written, "first\nsecond\n");
}

#[tokio::test]
async fn failing_command_keeps_stderr_tail() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "broken",
            TaskConfigBuilder::cmd("echo 'disk full' >&2; exit 7").build(),
        )
        .build();

    let report = with_timeout(run_dag(&cfg, Arc::new(RecordingSink::new())))
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Failed);
    let task = &report.tasks["broken"];
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.last_error.as_deref(), Some("exit code 7: disk full"));
}

#[tokio::test]
async fn fail_fast_kills_running_process() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .fail_fast(true)
        .with_task("boom", TaskConfigBuilder::cmd("sleep 0.1; exit 1").build())
        .with_task("sleeper", TaskConfigBuilder::cmd("sleep 30").build())
        .build();

    let started = std::time::Instant::now();
    let report = with_timeout(run_dag(&cfg, Arc::new(RecordingSink::new())))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.state_of("sleeper"), Some(TaskState::Failed));
}

#[tokio::test]
async fn scripted_runner_drives_retries_through_real_executor() {
    init_tracing();

    let dag = DagBuilder::new("scripted")
        .task(TaskDef::command("flaky", "flaky-cmd").with_retries(2, Duration::from_millis(5)))
        .task(TaskDef::command("next", "next-cmd"))
        .edge("flaky", "next")
        .build();

    let runner = Arc::new(ScriptedRunner::new().exit_codes("flaky-cmd", &[1, 1]));

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::with_runner(tx.clone(), runner.clone());
    let scheduler = Scheduler::new(dag, RunParams::new(), next_run_id(), false);
    let core = CoreRuntime::new(scheduler, RunOptions::default());

    let report = with_timeout(Runtime::new(core, rx, tx, executor).run())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.retry_count("flaky"), Some(2));
    assert_eq!(
        runner.calls(),
        vec!["flaky-cmd", "flaky-cmd", "flaky-cmd", "next-cmd"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_delay_retries_are_never_dropped() {
    init_tracing();

    for _ in 0..200 {
        let dag = DagBuilder::new("zero-delay")
            .task(TaskDef::command("flaky", "flaky-cmd").with_retries(5, Duration::ZERO))
            .build();
        let runner = Arc::new(ScriptedRunner::new().exit_codes("flaky-cmd", &[1, 1, 1, 1, 1]));

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = RealExecutorBackend::with_runner(tx.clone(), runner.clone());
        let scheduler = Scheduler::new(dag, RunParams::new(), next_run_id(), false);
        let core = CoreRuntime::new(scheduler, RunOptions::default());

        let report = with_timeout(Runtime::new(core, rx, tx, executor).run())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.retry_count("flaky"), Some(5));
        assert_eq!(runner.calls().len(), 6);
    }
}
