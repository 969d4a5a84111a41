// src/exec/task_runner.rs

//! Runs a single scheduled task.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::dag::{ScheduledTask, TaskRegistry};
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::{PipelineError, Result};

/// Run the task's action and send exactly one `TaskCompleted` back to the
/// runtime, whatever happens.
pub async fn run_task(
    registry: Arc<TaskRegistry>,
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let started = Instant::now();
    info!(task = %task.name, run_id = task.run_id, "starting task");

    let outcome = match execute(&registry, &task).await {
        Ok(()) => {
            info!(
                task = %task.name,
                run_id = task.run_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "task finished"
            );
            TaskOutcome::Success
        }
        Err(err) => {
            error!(
                task = %task.name,
                run_id = task.run_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "task failed"
            );
            TaskOutcome::Failed(err.to_string())
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            run_id: task.run_id,
            task: task.name.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        error!(
            task = %task.name,
            run_id = task.run_id,
            "runtime stopped before task completion could be reported"
        );
    }
}

async fn execute(registry: &TaskRegistry, task: &ScheduledTask) -> Result<()> {
    let action = registry.lookup(&task.name)?.action();
    match task.timeout {
        Some(after) => tokio::time::timeout(after, action.run(&task.name))
            .await
            .map_err(|_| PipelineError::Timeout {
                task: task.name.clone(),
                after,
            })?,
        None => action.run(&task.name).await,
    }
}
