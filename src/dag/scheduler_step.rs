// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::run::RunReport;
use crate::dag::task_info::{RunId, ScheduledTask};
use crate::types::TaskName;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step a Run and make
/// assertions about what changed.
#[derive(Debug, Clone)]
pub struct SchedulerStep {
    /// The Run this step applied to.
    pub run_id: RunId,
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly marked as failed in this step.
    pub newly_failed: Vec<TaskName>,
    /// Set when this step brought the Run to a terminal state.
    pub finished: Option<RunReport>,
}

impl SchedulerStep {
    pub(crate) fn empty(run_id: RunId) -> Self {
        Self {
            run_id,
            newly_scheduled: Vec::new(),
            newly_failed: Vec::new(),
            finished: None,
        }
    }

    /// Names of the newly scheduled tasks, in dispatch order.
    pub fn scheduled_names(&self) -> Vec<&str> {
        self.newly_scheduled.iter().map(|t| t.name.as_str()).collect()
    }
}
