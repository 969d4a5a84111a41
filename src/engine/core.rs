// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - pushing reload notifications
//! - handling Ctrl+C / shutdown
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::dag::{RunId, Scheduler};
use crate::engine::event_handlers::{
    handle_binding_trigger, handle_run_request, handle_task_completion, CoreCommand,
    CoreState, CoreStep, RunOrigin,
};
use crate::engine::queue::{BindingSpec, TriggerQueue};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::types::TriggerWhileRunningBehaviour;

/// Pure core runtime state.
///
/// This owns:
/// - the scheduler
/// - the per-binding trigger queue
/// - the origin of every active Run (binding, reload flag, changed paths)
/// - runtime options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    origins: HashMap<RunId, RunOrigin>,
    options: RuntimeOptions,
    /// Set by `ShutdownRequested`: no new Runs start, active ones finish.
    draining: bool,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        bindings: Vec<BindingSpec>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            queue: TriggerQueue::new(behaviour, bindings),
            origins: HashMap::new(),
            options,
            draining: false,
        }
    }

    /// Whether no Run is active.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Whether no binding has a queued follow-up.
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        if self.draining {
            match &event {
                RuntimeEvent::RunRequested { target, .. } => {
                    debug!(target = %target, "shutting down; ignoring run request");
                    return self.finish_step(Vec::new());
                }
                RuntimeEvent::BindingTriggered { binding, .. } => {
                    debug!(binding = %binding, "shutting down; ignoring trigger");
                    return self.finish_step(Vec::new());
                }
                _ => {}
            }
        }

        let mut state = CoreState {
            scheduler: &mut self.scheduler,
            queue: &mut self.queue,
            origins: &mut self.origins,
        };

        let commands = match event {
            RuntimeEvent::RunRequested {
                target,
                expr,
                reload,
            } => handle_run_request(&mut state, target, expr, reload),
            RuntimeEvent::BindingTriggered {
                binding,
                paths,
                content_hash,
            } => handle_binding_trigger(&mut state, binding, paths, content_hash),
            RuntimeEvent::TaskCompleted {
                run_id,
                task,
                outcome,
            } => handle_task_completion(&mut state, run_id, task, outcome),
            RuntimeEvent::ShutdownRequested => {
                let dropped = self.queue.drop_pending();
                info!(
                    active_runs = self.scheduler.active_runs().count(),
                    dropped_follow_ups = dropped,
                    "shutdown requested; waiting for active runs"
                );
                self.draining = true;
                Vec::new()
            }
        };

        self.finish_step(commands)
    }

    /// One-shot mode and a draining shutdown both end once nothing is
    /// running or queued.
    fn finish_step(&self, mut commands: Vec<CoreCommand>) -> CoreStep {
        let mut keep_running = true;
        if (self.options.exit_when_idle || self.draining)
            && self.scheduler.is_idle()
            && self.queue.is_empty()
        {
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::dag::{RunStatus, ScheduledTask, Task, TaskExpr, TaskRegistry};
    use crate::engine::TaskOutcome;
    use crate::exec::action::NoopAction;

    fn core(behaviour: TriggerWhileRunningBehaviour, exit_when_idle: bool) -> CoreRuntime {
        let mut reg = TaskRegistry::new();
        for name in ["css", "js"] {
            reg.register(Task::new(name, Arc::new(NoopAction))).unwrap();
        }
        CoreRuntime::new(
            Scheduler::new(Arc::new(reg)),
            behaviour,
            vec![BindingSpec {
                name: "styles".into(),
                expr: TaskExpr::task("css"),
                reload: true,
            }],
            RuntimeOptions { exit_when_idle },
        )
    }

    fn dispatched(step: &CoreStep) -> Vec<ScheduledTask> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(t) => Some(t.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn trigger(paths: &[&str]) -> RuntimeEvent {
        hashed_trigger(paths, None)
    }

    fn hashed_trigger(paths: &[&str], hash: Option<&str>) -> RuntimeEvent {
        RuntimeEvent::BindingTriggered {
            binding: "styles".into(),
            paths: paths.iter().map(PathBuf::from).collect(),
            content_hash: hash.map(str::to_string),
        }
    }

    fn committed(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::CommitContentHash { hash, .. } => Some(hash.clone()),
                _ => None,
            })
            .collect()
    }

    fn complete(task: &ScheduledTask) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            run_id: task.run_id,
            task: task.name.clone(),
            outcome: TaskOutcome::Success,
        }
    }

    #[test]
    fn one_shot_run_reports_and_exits() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, true);
        let step = core.step(RuntimeEvent::RunRequested {
            target: "build".into(),
            expr: TaskExpr::par(["css", "js"]),
            reload: false,
        });
        let tasks = dispatched(&step);
        assert_eq!(tasks.len(), 2);
        assert!(step.keep_running);

        core.step(complete(&tasks[0]));
        let last = core.step(complete(&tasks[1]));
        assert!(!last.keep_running);
        assert!(matches!(
            &last.commands[0],
            CoreCommand::ReportRun(r) if r.status == RunStatus::Succeeded
        ));
        assert!(matches!(last.commands.last(), Some(CoreCommand::RequestExit)));
    }

    #[test]
    fn binding_run_notifies_reload_with_changed_paths() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, false);
        let step = core.step(trigger(&["src/css/a.css"]));
        let tasks = dispatched(&step);

        let done = core.step(complete(&tasks[0]));
        assert!(done.keep_running);
        assert!(done.commands.iter().any(|c| matches!(
            c,
            CoreCommand::NotifyReload(p) if p == &vec![PathBuf::from("src/css/a.css")]
        )));
    }

    #[test]
    fn trigger_while_running_queues_a_single_follow_up() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, false);
        let first = dispatched(&core.step(trigger(&["a.css"])));

        assert!(dispatched(&core.step(trigger(&["b.css"]))).is_empty());
        assert!(dispatched(&core.step(trigger(&["c.css"]))).is_empty());
        assert!(!core.queue_is_empty());

        let step = core.step(complete(&first[0]));
        let follow_up = dispatched(&step);
        assert_eq!(follow_up.len(), 1);
        assert_ne!(follow_up[0].run_id, first[0].run_id);
        assert!(core.queue_is_empty());

        let done = core.step(complete(&follow_up[0]));
        assert!(dispatched(&done).is_empty());
        assert!(core.is_idle());
    }

    #[test]
    fn skip_mode_drops_trigger_while_running() {
        let mut core = core(TriggerWhileRunningBehaviour::Skip, false);
        let first = dispatched(&core.step(trigger(&["a.css"])));
        assert!(dispatched(&core.step(trigger(&["b.css"]))).is_empty());

        let step = core.step(complete(&first[0]));
        assert!(dispatched(&step).is_empty());
        assert!(core.is_idle());
    }

    #[test]
    fn content_hash_is_committed_only_when_a_run_starts() {
        let mut core = core(TriggerWhileRunningBehaviour::Skip, false);
        let step = core.step(hashed_trigger(&["a.css"], Some("v1")));
        assert_eq!(committed(&step), vec!["v1"]);
        let first = dispatched(&step);

        // Dropped while running: v2 must stay uncommitted.
        let skipped = core.step(hashed_trigger(&["a.css"], Some("v2")));
        assert!(committed(&skipped).is_empty());
        core.step(complete(&first[0]));

        // The same content saved again gets a Run.
        let retry = core.step(hashed_trigger(&["a.css"], Some("v2")));
        assert_eq!(committed(&retry), vec!["v2"]);
        assert_eq!(dispatched(&retry).len(), 1);
    }

    #[test]
    fn queued_follow_up_commits_latest_hash_when_it_starts() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, false);
        let first = dispatched(&core.step(hashed_trigger(&["a.css"], Some("v1"))));

        assert!(committed(&core.step(hashed_trigger(&["a.css"], Some("v2")))).is_empty());
        assert!(committed(&core.step(hashed_trigger(&["a.css"], Some("v3")))).is_empty());

        let step = core.step(complete(&first[0]));
        assert_eq!(committed(&step), vec!["v3"]);
        assert_eq!(dispatched(&step).len(), 1);
    }

    #[test]
    fn shutdown_lets_active_run_finish_and_drops_follow_ups() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, false);
        let first = dispatched(&core.step(trigger(&["a.css"])));
        core.step(trigger(&["b.css"]));

        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(core.is_draining());
        assert!(core.queue_is_empty());

        // New triggers are ignored while draining.
        assert!(dispatched(&core.step(trigger(&["c.css"]))).is_empty());

        let last = core.step(complete(&first[0]));
        assert!(dispatched(&last).is_empty());
        assert!(!last.keep_running);
        assert!(matches!(last.commands.last(), Some(CoreCommand::RequestExit)));
    }

    #[test]
    fn shutdown_when_idle_exits_immediately() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, false);
        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
    }

    #[test]
    fn unknown_target_is_rejected_and_one_shot_exits() {
        let mut core = core(TriggerWhileRunningBehaviour::Queue, true);
        let step = core.step(RuntimeEvent::RunRequested {
            target: "nope".into(),
            expr: TaskExpr::task("nope"),
            reload: false,
        });
        assert!(matches!(&step.commands[0], CoreCommand::RunRejected { target, .. } if target == "nope"));
        assert!(!step.keep_running);
    }
}
