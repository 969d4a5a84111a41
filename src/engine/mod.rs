// src/engine/mod.rs

//! Orchestration engine for assetpipe.
//!
//! This module ties together:
//! - the scheduler (one state machine per active Run)
//! - the per-binding trigger queue (what happens when a watch binding fires
//!   while its previous Run is still active)
//! - the main runtime event loop that reacts to:
//!   - explicit run requests (CLI target, `serve` build phase)
//!   - watch binding triggers
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::dag::{RunId, RunReport, Scheduler, TaskExpr, TaskRegistry};
use crate::errors::{PipelineError, Result};
use crate::exec::RealExecutorBackend;

pub use crate::types::TaskName;

/// Outcome of a task action for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The action failed; the message is recorded on the Run.
    Failed(String),
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no Run is active and nothing is
    /// queued (one-shot targets).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the CLI, watchers and executors.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run an expression once.
    RunRequested {
        target: String,
        expr: TaskExpr,
        /// Notify live-reload clients when the Run finishes.
        reload: bool,
    },
    /// A watch binding saw (debounced) changes to `paths`.
    BindingTriggered {
        binding: String,
        paths: Vec<PathBuf>,
        /// Aggregate content hash of a `use_hash` binding, committed only
        /// when a Run is started or queued for this trigger.
        content_hash: Option<String>,
    },
    /// A task action finished with a concrete outcome.
    TaskCompleted {
        run_id: RunId,
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::{BindingSpec, TriggerDecision, TriggerQueue};
pub use runtime::{Runtime, RuntimeSummary};

/// Run `expr` once with the real executor and return its report.
///
/// Unknown names and cycles are reported before anything runs.
pub async fn run_expression(
    registry: Arc<TaskRegistry>,
    target: &str,
    expr: TaskExpr,
) -> Result<RunReport> {
    registry.expand(&expr)?;

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(registry.clone(), tx.clone());
    let core = CoreRuntime::new(
        Scheduler::new(registry),
        Default::default(),
        Vec::new(),
        RuntimeOptions {
            exit_when_idle: true,
        },
    );

    tx.send(RuntimeEvent::RunRequested {
        target: target.to_string(),
        expr,
        reload: false,
    })
    .await
    .map_err(|e| anyhow!("queueing run of '{target}': {e}"))?;

    let summary = Runtime::new(core, rx, executor).run().await?;
    summary
        .last_report
        .ok_or_else(|| PipelineError::Other(anyhow!("run of '{target}' produced no report")))
}
