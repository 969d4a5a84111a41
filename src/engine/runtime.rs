// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{RunReport, ScheduledTask};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::reload::{LogNotifier, ReloadNotifier};
use crate::watch::ContentGate;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// What happened while the runtime was up.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSummary {
    pub completed_runs: usize,
    pub failed_runs: usize,
    /// Targets that could not be started, with the reason.
    pub rejected: Vec<(String, String)>,
    pub last_report: Option<RunReport>,
}

/// Drives the scheduler in response to `RuntimeEvent`s, delegates task
/// execution to an `ExecutorBackend`, and pushes reload notifications.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    notifier: Arc<dyn ReloadNotifier>,
    gate: Option<Arc<ContentGate>>,
    summary: RuntimeSummary,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            notifier: Arc::new(LogNotifier),
            gate: None,
            summary: RuntimeSummary::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Gate that receives the content hashes of started `use_hash` Runs.
    pub fn with_content_gate(mut self, gate: Option<Arc<ContentGate>>) -> Self {
        self.gate = gate;
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, reload, report, exit).
    pub async fn run(mut self) -> Result<RuntimeSummary> {
        info!("assetpipe runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!(
            completed_runs = self.summary.completed_runs,
            failed_runs = self.summary.failed_runs,
            "runtime exiting"
        );
        Ok(self.summary)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::NotifyReload(paths) => {
                self.notifier.notify(&paths);
            }
            CoreCommand::CommitContentHash { binding, hash } => {
                self.commit_hash(binding, hash).await;
            }
            CoreCommand::ReportRun(report) => {
                self.record(report);
            }
            CoreCommand::RunRejected { target, error } => {
                error!(target = %target, error = %error, "run rejected");
                self.summary.rejected.push((target, error));
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        let run_ids: Vec<_> = tasks.iter().map(|t| t.run_id).collect();
        debug!(?names, ?run_ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    async fn commit_hash(&self, binding: String, hash: String) {
        let Some(gate) = self.gate.clone() else {
            return;
        };
        let result = tokio::task::spawn_blocking(move || gate.commit(&binding, &hash)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to store binding content hash"),
            Err(e) => warn!(error = %e, "content hash task panicked"),
        }
    }

    fn record(&mut self, report: RunReport) {
        self.summary.completed_runs += 1;

        if report.is_success() {
            info!(
                run_id = report.run_id,
                target = %report.target,
                tasks = report.leaves.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "run succeeded"
            );
        } else {
            self.summary.failed_runs += 1;
            for (task, message) in report.errors.iter() {
                error!(run_id = report.run_id, task = %task, "{}", message);
            }
            error!(
                run_id = report.run_id,
                target = %report.target,
                failed = ?report.failed(),
                skipped = ?report.skipped(),
                "run failed"
            );
        }

        self.summary.last_report = Some(report);
    }
}
