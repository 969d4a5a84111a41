// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::dag::{RunId, RunReport, ScheduledTask, Scheduler, SchedulerStep, TaskExpr};
use crate::engine::queue::{TriggerDecision, TriggerQueue};
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Tell live-reload clients that these paths changed (empty: everything).
    NotifyReload(Vec<PathBuf>),
    /// A Run started for a `use_hash` binding; store its content hash.
    CommitContentHash { binding: String, hash: String },
    /// A Run reached a terminal state.
    ReportRun(RunReport),
    /// A requested expression could not be started.
    RunRejected { target: String, error: String },
    /// Request that the process exits (one-shot targets when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Why a Run exists, remembered until it finishes.
#[derive(Debug, Clone)]
pub(crate) struct RunOrigin {
    pub binding: Option<String>,
    pub reload: bool,
    pub paths: Vec<PathBuf>,
    /// Committed when the Run actually starts.
    pub content_hash: Option<String>,
}

/// Mutable core state the handlers operate on.
#[derive(Debug)]
pub(crate) struct CoreState<'a> {
    pub scheduler: &'a mut Scheduler,
    pub queue: &'a mut TriggerQueue,
    pub origins: &'a mut HashMap<RunId, RunOrigin>,
}

/// Handle an explicit request to run an expression.
pub(crate) fn handle_run_request(
    state: &mut CoreState<'_>,
    target: String,
    expr: TaskExpr,
    reload: bool,
) -> Vec<CoreCommand> {
    let origin = RunOrigin {
        binding: None,
        reload,
        paths: Vec::new(),
        content_hash: None,
    };
    launch(state, target, &expr, origin)
}

/// Handle a debounced watch binding trigger.
///
/// - If the binding has no active Run, start one.
/// - Otherwise queue or drop the trigger per the configured behaviour.
///
/// A content hash is only committed for a trigger that starts a Run, either
/// now or as the queued follow-up.
pub(crate) fn handle_binding_trigger(
    state: &mut CoreState<'_>,
    binding: String,
    paths: Vec<PathBuf>,
    content_hash: Option<String>,
) -> Vec<CoreCommand> {
    match state.queue.on_trigger(&binding, paths, content_hash) {
        TriggerDecision::Start {
            expr,
            paths,
            content_hash,
        } => launch_binding(state, binding, &expr, paths, content_hash),
        TriggerDecision::Queued | TriggerDecision::Skipped => Vec::new(),
        TriggerDecision::Unknown => {
            warn!(binding = %binding, "trigger for unknown watch binding; ignoring");
            Vec::new()
        }
    }
}

/// Handle a task completion event.
pub(crate) fn handle_task_completion(
    state: &mut CoreState<'_>,
    run_id: RunId,
    task: TaskName,
    outcome: TaskOutcome,
) -> Vec<CoreCommand> {
    let step = state.scheduler.step_completion(run_id, &task, outcome);
    apply_step(state, step)
}

fn launch_binding(
    state: &mut CoreState<'_>,
    binding: String,
    expr: &TaskExpr,
    paths: Vec<PathBuf>,
    content_hash: Option<String>,
) -> Vec<CoreCommand> {
    let reload = state.queue.spec(&binding).is_some_and(|s| s.reload);
    let origin = RunOrigin {
        binding: Some(binding.clone()),
        reload,
        paths,
        content_hash,
    };
    launch(state, binding, expr, origin)
}

/// Start a Run and record where it came from.
fn launch(
    state: &mut CoreState<'_>,
    target: String,
    expr: &TaskExpr,
    mut origin: RunOrigin,
) -> Vec<CoreCommand> {
    match state.scheduler.start_run(target.clone(), expr) {
        Ok(step) => {
            let mut commands = Vec::new();
            if let Some(binding) = &origin.binding {
                state.queue.run_started(binding, step.run_id);
                if let Some(hash) = origin.content_hash.take() {
                    commands.push(CoreCommand::CommitContentHash {
                        binding: binding.clone(),
                        hash,
                    });
                }
            }
            debug!(run_id = step.run_id, target = %target, "run launched");
            state.origins.insert(step.run_id, origin);
            commands.extend(apply_step(state, step));
            commands
        }
        Err(e) => {
            error!(target = %target, error = %e, "cannot start run");
            if let Some(binding) = &origin.binding {
                // Nothing is running for this binding; release it.
                state.queue.run_finished(binding);
            }
            vec![CoreCommand::RunRejected {
                target,
                error: e.to_string(),
            }]
        }
    }
}

fn apply_step(state: &mut CoreState<'_>, step: SchedulerStep) -> Vec<CoreCommand> {
    let mut commands = Vec::new();
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if let Some(report) = step.finished {
        commands.extend(finish_run(state, report));
    }
    commands
}

/// Report a finished Run, notify reload clients, and start the binding's
/// queued follow-up Run if there is one.
fn finish_run(state: &mut CoreState<'_>, report: RunReport) -> Vec<CoreCommand> {
    let origin = state.origins.remove(&report.run_id);
    let mut commands = vec![CoreCommand::ReportRun(report)];

    let Some(origin) = origin else {
        return commands;
    };

    if origin.reload {
        commands.push(CoreCommand::NotifyReload(origin.paths));
    }

    if let Some(binding) = origin.binding {
        if let Some(follow_up) = state.queue.run_finished(&binding) {
            debug!(binding = %binding, "starting queued follow-up run");
            commands.extend(launch_binding(
                state,
                binding,
                &follow_up.expr,
                follow_up.paths,
                follow_up.content_hash,
            ));
        }
    }

    commands
}
