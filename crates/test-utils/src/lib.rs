pub mod builders;
pub mod fake_executor;

use std::sync::{Arc, Once};

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use branchdag::dag::{Dag, RunReport, Scheduler, next_run_id};
use branchdag::engine::{CoreRuntime, RunEvent, RunOptions, Runtime, RuntimeEvent};
use branchdag::errors::Result;
use branchdag::types::RunParams;

pub use builders::{ConfigFileBuilder, DagBuilder, TaskConfigBuilder};
pub use fake_executor::{FakeExecutor, FakeExecutorHandle, RecordingSink, ScriptedRunner};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Everything observable about a run driven by a [`FakeExecutor`].
pub struct FakeRun {
    pub report: Result<RunReport>,
    pub executor: FakeExecutorHandle,
    pub events: Vec<RunEvent>,
}

impl FakeRun {
    /// The report of a run that must not have errored.
    pub fn report(&self) -> &RunReport {
        self.report.as_ref().expect("run returned an error")
    }
}

/// Drive a full run of `dag` through the real runtime with a fake executor.
///
/// `configure` scripts the executor. All notifications are recorded
/// regardless of `options.notify`'s filtering, which still applies.
pub async fn run_with_fake(
    dag: Arc<Dag>,
    params: RunParams,
    options: RunOptions,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> FakeRun {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = configure(FakeExecutor::new(tx.clone()));
    let handle = executor.handle();
    let sink = RecordingSink::new();

    let scheduler = Scheduler::new(dag, params, next_run_id(), options.fail_fast);
    let core = CoreRuntime::new(scheduler, options);
    let runtime = Runtime::new(core, rx, tx, executor).with_sink(Arc::new(sink.clone()));

    let report = with_timeout(runtime.run()).await;

    FakeRun {
        report,
        executor: handle,
        events: sink.events(),
    }
}
