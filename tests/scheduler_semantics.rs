// tests/scheduler_semantics.rs

use std::sync::Arc;

use assetpipe::dag::{LeafStatus, RunStatus, Scheduler, Task, TaskExpr, TaskRegistry};
use assetpipe::engine::TaskOutcome;
use assetpipe::exec::action::NoopAction;

fn registry(names: &[&str]) -> Arc<TaskRegistry> {
    let mut reg = TaskRegistry::new();
    for name in names {
        reg.register(Task::new(*name, Arc::new(NoopAction))).unwrap();
    }
    Arc::new(reg)
}

fn outcome_failing(failing: &'static [&'static str]) -> impl FnMut(&str) -> TaskOutcome {
    move |task| {
        if failing.contains(&task) {
            TaskOutcome::Failed(format!("{task} broke"))
        } else {
            TaskOutcome::Success
        }
    }
}

#[test]
fn sequence_stops_at_first_failure() {
    let mut scheduler = Scheduler::new(registry(&["a", "b", "c", "d"]));
    let expr = TaskExpr::seq(["a", "b", "c", "d"]);

    let report = scheduler
        .simulate("chain", &expr, outcome_failing(&["b"]))
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.started_order, vec!["a", "b"]);
    assert_eq!(report.leaf("a"), Some(LeafStatus::Succeeded));
    assert_eq!(report.leaf("b"), Some(LeafStatus::Failed));
    assert_eq!(report.skipped(), vec!["c".to_string(), "d".to_string()]);
    assert_eq!(report.errors, vec![("b".to_string(), "b broke".to_string())]);
}

#[test]
fn parallel_runs_every_member_despite_failures() {
    let mut scheduler = Scheduler::new(registry(&["a", "b", "c"]));
    let expr = TaskExpr::par(["a", "b", "c"]);

    let report = scheduler
        .simulate("all", &expr, outcome_failing(&["a"]))
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.started_order.len(), 3);
    assert_eq!(report.leaf("b"), Some(LeafStatus::Succeeded));
    assert_eq!(report.leaf("c"), Some(LeafStatus::Succeeded));
    assert!(report.skipped().is_empty());
}

#[test]
fn styles_group_fails_but_css_still_succeeds() {
    let mut reg = TaskRegistry::new();
    for name in ["css", "scss", "templates"] {
        reg.register(Task::new(name, Arc::new(NoopAction))).unwrap();
    }
    reg.define("styles", TaskExpr::par(["css", "scss"])).unwrap();
    reg.define(
        "build",
        TaskExpr::seq([TaskExpr::task("styles"), TaskExpr::task("templates")]),
    )
    .unwrap();
    let mut scheduler = Scheduler::new(Arc::new(reg));

    let styles = scheduler
        .simulate("styles", &TaskExpr::task("styles"), outcome_failing(&["scss"]))
        .unwrap();
    assert_eq!(styles.status, RunStatus::Failed);
    assert_eq!(styles.leaf("css"), Some(LeafStatus::Succeeded));
    assert_eq!(styles.leaf("scss"), Some(LeafStatus::Failed));

    // The failed group fails the enclosing Sequence before `templates`.
    let build = scheduler
        .simulate("build", &TaskExpr::task("build"), outcome_failing(&["scss"]))
        .unwrap();
    assert_eq!(build.leaf("templates"), Some(LeafStatus::Skipped));
}

#[test]
fn failed_branch_does_not_abort_sibling_sequence() {
    let mut scheduler = Scheduler::new(registry(&["a1", "a2", "b1", "b2"]));
    let expr = TaskExpr::par([TaskExpr::seq(["a1", "a2"]), TaskExpr::seq(["b1", "b2"])]);

    let report = scheduler
        .simulate("branches", &expr, outcome_failing(&["a1"]))
        .unwrap();

    assert_eq!(report.leaf("a2"), Some(LeafStatus::Skipped));
    assert_eq!(report.leaf("b1"), Some(LeafStatus::Succeeded));
    assert_eq!(report.leaf("b2"), Some(LeafStatus::Succeeded));
}

#[test]
fn predecessors_run_before_their_task() {
    let mut reg = TaskRegistry::new();
    reg.register(Task::new("clean", Arc::new(NoopAction))).unwrap();
    reg.register(Task::new("fonts", Arc::new(NoopAction))).unwrap();
    reg.register(Task::new("css", Arc::new(NoopAction)).after(["clean", "fonts"]))
        .unwrap();
    let mut scheduler = Scheduler::new(Arc::new(reg));

    let report = scheduler
        .simulate("css", &TaskExpr::task("css"), outcome_failing(&[]))
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.started_order.last().map(String::as_str), Some("css"));
    assert_eq!(report.started_order.len(), 3);
}

#[test]
fn shared_leaf_runs_once_per_run() {
    let mut scheduler = Scheduler::new(registry(&["lint", "css", "js"]));
    let expr = TaskExpr::par([TaskExpr::seq(["lint", "css"]), TaskExpr::seq(["lint", "js"])]);

    let report = scheduler
        .simulate("both", &expr, outcome_failing(&[]))
        .unwrap();

    assert!(report.is_success());
    let lint_runs = report.started_order.iter().filter(|t| *t == "lint").count();
    assert_eq!(lint_runs, 1);
}
