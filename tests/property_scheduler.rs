use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use branchdag::dag::{Dag, RunReport, Scheduler, TaskDef, TaskState};
use branchdag::engine::{ActionFailure, TaskOutcome};
use branchdag::types::{RunParams, TriggerRule};
use branchdag_test_utils::DagBuilder;

#[derive(Debug, Clone)]
struct TaskSpec {
    deps: Vec<usize>,
    one_success: bool,
    /// Attempts that fail before the task succeeds.
    failures: u32,
    retries: u32,
    /// For branch tasks: index into the successor list.
    branch_pick: Option<usize>,
}

// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskSpec>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                any::<bool>(),
                0u32..3,
                0u32..3,
                proptest::option::weighted(0.3, 0usize..4),
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (deps, one_success, failures, retries, branch_pick))| {
                    let mut valid: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    };
                    valid.sort();
                    valid.dedup();
                    TaskSpec {
                        deps: valid,
                        one_success,
                        failures,
                        retries,
                        branch_pick,
                    }
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn build_dag(specs: &[TaskSpec]) -> Arc<Dag> {
    let successors = |i: usize| -> Vec<String> {
        specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.deps.contains(&i))
            .map(|(j, _)| name(j))
            .collect()
    };

    let mut builder = DagBuilder::new("prop");
    for (i, spec) in specs.iter().enumerate() {
        let succ = successors(i);
        let mut def = match spec.branch_pick {
            Some(pick) if !succ.is_empty() => {
                let chosen = succ[pick % succ.len()].clone();
                TaskDef::branch(name(i), move |_: &RunParams| {
                    Ok::<_, anyhow::Error>(chosen.clone())
                })
            }
            _ => TaskDef::noop(name(i)),
        };
        if spec.one_success {
            def = def.with_trigger_rule(TriggerRule::OneSuccess);
        }
        builder = builder.task(def.with_retries(spec.retries, Duration::ZERO));
        for d in &spec.deps {
            builder = builder.edge(&name(*d), &name(i));
        }
    }
    builder.build()
}

/// Drive the pure scheduler to the end, completing dispatched tasks in FIFO
/// order and firing retries immediately.
fn simulate(dag: Arc<Dag>, specs: &[TaskSpec]) -> (RunReport, Vec<String>) {
    let mut scheduler = Scheduler::new(dag.clone(), RunParams::new(), 1, false);
    let now = Instant::now();
    let mut dispatched_log = Vec::new();
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    let mut retries: VecDeque<String> = VecDeque::new();

    let step = scheduler.start(now).expect("start");
    for t in step.dispatched {
        dispatched_log.push(t.id.clone());
        queue.push_back((t.id, t.attempt));
    }

    let mut guard = 0;
    while !scheduler.is_finished() {
        guard += 1;
        assert!(guard < 10_000, "simulation did not terminate");

        let step = if let Some((id, attempt)) = queue.pop_front() {
            let idx: usize = id["task_".len()..].parse().unwrap();
            let outcome = if attempt <= specs[idx].failures {
                TaskOutcome::Failed(ActionFailure::exit(1, ""))
            } else {
                let def = dag.task(&id).unwrap();
                match &def.kind {
                    branchdag::dag::TaskKind::BranchDecision { decider } => {
                        TaskOutcome::Branched(decider.decide(&RunParams::new()).unwrap())
                    }
                    _ => TaskOutcome::Success,
                }
            };
            scheduler.handle_completion(&id, attempt, outcome, now)
        } else if let Some(id) = retries.pop_front() {
            scheduler.handle_retry_due(&id, now)
        } else {
            panic!("nothing in flight but run not finished");
        }
        .expect("scheduler pass failed");

        for (id, _) in step.retries {
            retries.push_back(id);
        }
        for t in step.dispatched {
            dispatched_log.push(t.id.clone());
            queue.push_back((t.id, t.attempt));
        }
    }

    (scheduler.report(), dispatched_log)
}

proptest! {
    #[test]
    fn scheduler_always_terminates_with_every_task_terminal(specs in dag_strategy(12)) {
        let dag = build_dag(&specs);
        let (report, dispatched) = simulate(dag.clone(), &specs);

        for (id, task) in report.tasks.iter() {
            prop_assert!(task.state.is_terminal(), "{id} ended {:?}", task.state);
            prop_assert!(task.retry_count <= dag.task(id).unwrap().retry_limit);
        }

        // Completed iff nothing failed.
        let any_failed = report.tasks.values().any(|t| t.state.is_failure());
        prop_assert_eq!(report.succeeded(), !any_failed);

        // A task is dispatched once per attempt and never after it went terminal.
        for (id, task) in report.tasks.iter() {
            let count = dispatched.iter().filter(|d| *d == id).count() as u32;
            prop_assert_eq!(count, task.attempts);
            if matches!(task.state, TaskState::Skipped | TaskState::UpstreamFailed) {
                prop_assert_eq!(count, 0);
            }
        }

        // Nothing ran before all of its AllSuccess predecessors succeeded.
        let ran: HashSet<&String> = dispatched.iter().collect();
        for id in ran {
            let def = dag.task(id).unwrap();
            if def.trigger_rule == TriggerRule::AllSuccess {
                for pred in dag.graph().predecessors_of(id) {
                    prop_assert_eq!(report.state_of(pred), Some(TaskState::Success));
                }
            }
        }
    }

    #[test]
    fn scheduler_is_deterministic(specs in dag_strategy(10)) {
        let dag = build_dag(&specs);
        let (first, first_log) = simulate(dag.clone(), &specs);
        let (second, second_log) = simulate(dag, &specs);

        prop_assert_eq!(first.tasks, second.tasks);
        prop_assert_eq!(first_log, second_log);
    }
}
