use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::expr::TaskExpr;
use crate::dag::registry::TaskRegistry;
use crate::dag::run::{Run, RunReport};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::task_info::{RunId, ScheduledTask};
use crate::engine::TaskOutcome;
use crate::errors::{PipelineError, Result};
use crate::types::TaskName;

/// Scheduler holds the shared task registry plus every active Run.
///
/// It is responsible for:
/// - expanding a requested expression and starting a Run for it
/// - routing task completions to their Run
/// - reporting which tasks became ready and when a Run finishes
///
/// It performs no IO; the engine feeds it events and dispatches the tasks
/// it returns.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    runs: BTreeMap<RunId, Run>,
    /// Monotonically increasing run ID.
    run_counter: RunId,
}

impl Scheduler {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            runs: BTreeMap::new(),
            run_counter: 0,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn active_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    pub fn run(&self, id: RunId) -> Option<&Run> {
        self.runs.get(&id)
    }

    /// Expand `expr` and start a new Run of it.
    ///
    /// Fails with `UnknownTask`/`DagCycle` if the expression does not
    /// resolve; no Run is created in that case. An expression with no
    /// leaves finishes within this step.
    pub fn start_run(&mut self, target: impl Into<String>, expr: &TaskExpr) -> Result<SchedulerStep> {
        let target = target.into();
        let expanded = self.registry.expand(expr)?;

        self.run_counter += 1;
        let run_id = self.run_counter;

        let (run, started) = Run::start(run_id, target.clone(), &expanded);
        info!(run_id, target = %target, expr = %expanded, "starting run");

        let mut step = SchedulerStep::empty(run_id);
        step.newly_scheduled = self.schedule(run_id, started);
        self.settle(run, &mut step);
        Ok(step)
    }

    /// Feed the outcome of a finished task into its Run.
    pub fn step_completion(&mut self, run_id: RunId, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::empty(run_id);

        let Some(mut run) = self.runs.remove(&run_id) else {
            warn!(run_id, task = %task, "completion for unknown or finished run; ignoring");
            return step;
        };

        debug!(run_id, task = %task, ?outcome, "task completed");
        let transition = run.complete(task, &outcome);
        step.newly_failed = transition.failed;
        step.newly_scheduled = self.schedule(run_id, transition.started);
        self.settle(run, &mut step);
        step
    }

    /// Keep the Run if it is still active; otherwise attach its report.
    fn settle(&mut self, run: Run, step: &mut SchedulerStep) {
        if run.is_finished() {
            let report = run.report();
            info!(
                run_id = report.run_id,
                target = %report.target,
                status = ?report.status,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "run finished"
            );
            step.finished = Some(report);
        } else {
            self.runs.insert(run.id(), run);
        }
    }

    fn schedule(&self, run_id: RunId, names: Vec<TaskName>) -> Vec<ScheduledTask> {
        names
            .into_iter()
            .map(|name| {
                // Expansion only yields registered tasks.
                let timeout = self.registry.lookup(&name).ok().and_then(|t| t.timeout());
                ScheduledTask {
                    name,
                    run_id,
                    timeout,
                }
            })
            .collect()
    }

    /// Run an expression to completion with outcomes decided by `outcome_of`,
    /// dispatching tasks in FIFO order. Returns the final report.
    pub fn simulate<F>(&mut self, target: &str, expr: &TaskExpr, mut outcome_of: F) -> Result<RunReport>
    where
        F: FnMut(&str) -> TaskOutcome,
    {
        let mut step = self.start_run(target, expr)?;
        let mut queue: VecDeque<ScheduledTask> = step.newly_scheduled.drain(..).collect();
        let mut finished = step.finished.take();

        while finished.is_none() {
            let Some(task) = queue.pop_front() else {
                break;
            };
            let outcome = outcome_of(&task.name);
            let mut next = self.step_completion(task.run_id, &task.name, outcome);
            queue.extend(next.newly_scheduled.drain(..));
            finished = next.finished.take();
        }

        finished.ok_or_else(|| {
            PipelineError::Other(anyhow::anyhow!(
                "run of '{target}' stalled with no runnable tasks"
            ))
        })
    }
}
