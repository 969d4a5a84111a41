// tests/property_scheduler.rs

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use assetpipe::dag::{LeafStatus, RunStatus, Scheduler, Task, TaskExpr, TaskRegistry};
use assetpipe::engine::TaskOutcome;
use assetpipe::exec::action::NoopAction;

const TASKS: usize = 6;

fn registry() -> Arc<TaskRegistry> {
    let mut reg = TaskRegistry::new();
    for i in 0..TASKS {
        reg.register(Task::new(format!("t{i}"), Arc::new(NoopAction)))
            .unwrap();
    }
    Arc::new(reg)
}

// Random nested compositions over a small pool of tasks, so the same task
// is regularly referenced from several branches.
fn expr_strategy() -> impl Strategy<Value = TaskExpr> {
    let leaf = (0..TASKS).prop_map(|i| TaskExpr::task(format!("t{i}")));
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 1..4).prop_map(TaskExpr::Sequence),
            proptest::collection::vec(inner, 1..4).prop_map(TaskExpr::Parallel),
        ]
    })
}

fn failing_strategy() -> impl Strategy<Value = HashSet<String>> {
    proptest::collection::hash_set((0..TASKS).prop_map(|i| format!("t{i}")), 0..3)
}

proptest! {
    #[test]
    fn every_run_terminates_with_terminal_leaves(
        expr in expr_strategy(),
        failing in failing_strategy(),
    ) {
        let mut scheduler = Scheduler::new(registry());
        let report = scheduler
            .simulate("prop", &expr, |task| {
                if failing.contains(task) {
                    TaskOutcome::Failed(format!("{task} failed"))
                } else {
                    TaskOutcome::Success
                }
            })
            .unwrap();

        prop_assert!(scheduler.is_idle());
        prop_assert_ne!(report.status, RunStatus::Running);

        let mut seen = HashSet::new();
        for task in report.started_order.iter() {
            // A task runs at most once per Run.
            prop_assert!(seen.insert(task.clone()));
        }

        for (task, status) in report.leaves.iter() {
            prop_assert!(status.is_terminal(), "{task} left {status:?}");
            match status {
                LeafStatus::Failed => prop_assert!(failing.contains(task)),
                LeafStatus::Succeeded => prop_assert!(!failing.contains(task)),
                LeafStatus::Skipped => prop_assert!(!seen.contains(task)),
                _ => {}
            }
        }

        let any_failed = report.leaves.iter().any(|(_, s)| *s == LeafStatus::Failed);
        prop_assert_eq!(report.status == RunStatus::Failed, any_failed);
        if failing.is_empty() {
            prop_assert!(report.is_success());
            prop_assert!(report.skipped().is_empty());
        }
    }

    #[test]
    fn sequence_never_starts_past_first_failure(
        len in 1..=TASKS,
        fail_at in 0..TASKS,
    ) {
        let names: Vec<String> = (0..len).map(|i| format!("t{i}")).collect();
        let expr = TaskExpr::seq(names.iter().map(String::as_str));
        let failing = names.get(fail_at).cloned();

        let mut scheduler = Scheduler::new(registry());
        let report = scheduler
            .simulate("chain", &expr, |task| {
                if failing.as_deref() == Some(task) {
                    TaskOutcome::Failed("boom".into())
                } else {
                    TaskOutcome::Success
                }
            })
            .unwrap();

        match failing.as_deref() {
            Some(_) => {
                prop_assert_eq!(report.status, RunStatus::Failed);
                prop_assert_eq!(&report.started_order, &names[..=fail_at].to_vec());
                prop_assert_eq!(report.skipped(), names[fail_at + 1..].to_vec());
            }
            None => {
                prop_assert_eq!(report.status, RunStatus::Succeeded);
                prop_assert_eq!(&report.started_order, &names);
            }
        }
    }
}
