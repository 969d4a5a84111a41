use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use assetpipe::dag::{RunId, ScheduledTask};
use assetpipe::engine::{RuntimeEvent, TaskOutcome};
use assetpipe::errors::Result;
use assetpipe::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// Shared record of `(run_id, task)` dispatches, in dispatch order.
pub type Dispatched = Arc<Mutex<Vec<(RunId, String)>>>;

/// A fake executor that:
/// - records which tasks were dispatched
/// - immediately reports `TaskCompleted` for each one, succeeding unless the
///   task was scripted to fail with [`FakeExecutor::fail`].
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    failures: HashMap<String, Failure>,
    dispatched: Dispatched,
}

#[derive(Debug, Clone)]
struct Failure {
    message: String,
    once: bool,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            failures: HashMap::new(),
            dispatched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every run of `task` fail with `message`.
    pub fn fail(mut self, task: &str, message: &str) -> Self {
        self.failures.insert(
            task.to_string(),
            Failure {
                message: message.to_string(),
                once: false,
            },
        );
        self
    }

    /// Make only the next run of `task` fail; later runs succeed.
    pub fn fail_once(mut self, task: &str, message: &str) -> Self {
        self.failures.insert(
            task.to_string(),
            Failure {
                message: message.to_string(),
                once: true,
            },
        );
        self
    }

    /// Handle to the dispatch log; stays valid after the executor moves into
    /// a `Runtime`.
    pub fn dispatched(&self) -> Dispatched {
        Arc::clone(&self.dispatched)
    }

    /// Task names from a dispatch log, ignoring run ids.
    pub fn names(log: &Dispatched) -> Vec<String> {
        log.lock()
            .expect("dispatch log poisoned")
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);

        let outcomes: Vec<TaskOutcome> = tasks
            .iter()
            .map(|t| match self.failures.get(&t.name).cloned() {
                Some(failure) => {
                    if failure.once {
                        self.failures.remove(&t.name);
                    }
                    TaskOutcome::Failed(failure.message)
                }
                None => TaskOutcome::Success,
            })
            .collect();

        Box::pin(async move {
            for (t, outcome) in tasks.into_iter().zip(outcomes) {
                dispatched
                    .lock()
                    .map_err(|_| anyhow!("dispatch log poisoned"))?
                    .push((t.run_id, t.name.clone()));

                tx.send(RuntimeEvent::TaskCompleted {
                    run_id: t.run_id,
                    task: t.name.clone(),
                    outcome,
                })
                .await
                .map_err(|e| anyhow!("runtime gone: {e}"))?;
            }
            Ok(())
        })
    }
}
