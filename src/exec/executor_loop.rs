// src/exec/executor_loop.rs

//! Background loop that starts scheduled tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::{RunId, ScheduledTask, TaskRegistry};
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::types::TaskName;

/// Handle for the most recent instance of a task name.
struct ActiveTask {
    run_id: RunId,
    handle: JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` forwards scheduled
/// tasks to. Each task runs in its own Tokio task, so Parallel members run
/// concurrently. Two Runs may schedule the same task name at once (e.g. two
/// watch bindings sharing a task); both instances run, and a warning is
/// logged because their outputs may overlap.
///
/// When the sender is dropped the loop waits for in-flight tasks before
/// exiting.
pub fn spawn_executor(
    registry: Arc<TaskRegistry>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<TaskName, ActiveTask> = HashMap::new();

        while let Some(task) = rx.recv().await {
            handle_scheduled_task(task, &mut active, &registry, &runtime_tx);
        }

        let in_flight: Vec<_> = active
            .into_values()
            .filter(|a| !a.handle.is_finished())
            .collect();
        if !in_flight.is_empty() {
            debug!(count = in_flight.len(), "waiting for in-flight tasks");
        }
        for task in in_flight {
            let _ = task.handle.await;
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<TaskName, ActiveTask>,
    registry: &Arc<TaskRegistry>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = task.name.clone();
    let run_id = task.run_id;

    if let Some(existing) = active.get(&name) {
        if !existing.handle.is_finished() && existing.run_id != run_id {
            warn!(
                task = %name,
                run_id,
                other_run_id = existing.run_id,
                "task is already running for another run; starting a second instance"
            );
        }
    }

    let registry = Arc::clone(registry);
    let rt_tx = runtime_tx.clone();
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_task(registry, task, rt_tx).await;
        debug!(task = %spawn_name, run_id, "task runner future finished");
    });

    active.insert(name, ActiveTask { run_id, handle });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Task;
    use crate::engine::TaskOutcome;
    use crate::exec::action::NoopAction;

    #[tokio::test]
    async fn reports_completion_for_each_scheduled_task() {
        let mut reg = TaskRegistry::new();
        reg.register(Task::new("a", Arc::new(NoopAction))).unwrap();
        reg.register(Task::new("b", Arc::new(NoopAction))).unwrap();

        let (rt_tx, mut rt_rx) = mpsc::channel(8);
        let exec_tx = spawn_executor(Arc::new(reg), rt_tx);

        for (name, run_id) in [("a", 1), ("b", 1), ("a", 2)] {
            exec_tx
                .send(ScheduledTask {
                    name: name.to_string(),
                    run_id,
                    timeout: None,
                })
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            match rt_rx.recv().await.unwrap() {
                RuntimeEvent::TaskCompleted {
                    run_id,
                    task,
                    outcome,
                } => {
                    assert_eq!(outcome, TaskOutcome::Success);
                    seen.push((task, run_id));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![("a".to_string(), 1), ("a".to_string(), 2), ("b".to_string(), 1)]
        );
    }
}
