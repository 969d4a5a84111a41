// src/dag/task_info.rs

//! Types describing a task the scheduler wants executed.

use std::time::Duration;

use crate::types::TaskName;

/// Monotonically increasing identifier of a Run.
pub type RunId = u64;

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    /// The Run this execution belongs to. Completions are reported back
    /// against it, so the same task may be in flight for several Runs.
    pub run_id: RunId,
    /// Fail the task if it has not finished after this long.
    pub timeout: Option<Duration>,
}
