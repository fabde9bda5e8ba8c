use std::time::Duration;

use branchdag::dag::{RunPhase, TaskDef, TaskState};
use branchdag::engine::{RunEvent, RunOptions};
use branchdag::types::RunParams;
use branchdag_test_utils::{DagBuilder, init_tracing, run_with_fake};

fn fail_fast() -> RunOptions {
    RunOptions {
        fail_fast: true,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn first_failure_cancels_running_tasks() {
    init_tracing();

    let dag = DagBuilder::new("fail-fast")
        .task(TaskDef::command("boom", "exit 1"))
        .task(TaskDef::command("long", "sleep 600"))
        .noop("after_long")
        .noop("after_boom")
        .edge("long", "after_long")
        .edge("boom", "after_boom")
        .build();

    let run = run_with_fake(dag, RunParams::new(), fail_fast(), |exec| {
        exec.fail_times("boom", 1).hang("long")
    })
    .await;
    let report = run.report();

    assert_eq!(report.phase, RunPhase::Failed);
    assert_eq!(run.executor.cancelled(), vec!["long"]);
    assert_eq!(report.state_of("boom"), Some(TaskState::Failed));
    assert_eq!(report.state_of("long"), Some(TaskState::Failed));
    assert!(
        report.tasks["long"]
            .last_error
            .as_deref()
            .is_some_and(|e| e.starts_with("cancelled"))
    );
    assert_eq!(report.state_of("after_long"), Some(TaskState::UpstreamFailed));
    assert_eq!(report.state_of("after_boom"), Some(TaskState::UpstreamFailed));
}

#[tokio::test]
async fn late_results_of_cancelled_tasks_are_discarded() {
    let dag = DagBuilder::new("late-result")
        .task(TaskDef::command("boom", "exit 1"))
        .task(TaskDef::command("slow", "sleep 1"))
        .build();

    let run = run_with_fake(dag, RunParams::new(), fail_fast(), |exec| {
        exec.fail_times("boom", 1)
            .delay("slow", Duration::from_millis(50))
    })
    .await;

    // The run ends as soon as `boom` fails; `slow`'s success never lands.
    assert_eq!(run.report().state_of("slow"), Some(TaskState::Failed));
    assert!(
        !run.events
            .iter()
            .any(|e| matches!(e, RunEvent::TaskSucceeded { task, .. } if task == "slow"))
    );
}

#[tokio::test]
async fn without_fail_fast_other_branches_finish() {
    let dag = DagBuilder::new("no-fail-fast")
        .task(TaskDef::command("boom", "exit 1"))
        .task(TaskDef::command("long", "sleep 1"))
        .noop("after_long")
        .edge("long", "after_long")
        .build();

    let run = run_with_fake(dag, RunParams::new(), RunOptions::default(), |exec| {
        exec.fail_times("boom", 1)
            .delay("long", Duration::from_millis(30))
    })
    .await;
    let report = run.report();

    assert_eq!(report.phase, RunPhase::Failed);
    assert!(run.executor.cancelled().is_empty());
    assert_eq!(report.state_of("after_long"), Some(TaskState::Success));
}
