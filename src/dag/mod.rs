// src/dag/mod.rs

//! Task registry, expressions and scheduling.
//!
//! - [`expr`] defines composite task expressions (`Task`, `Sequence`, `Parallel`).
//! - [`registry`] holds named tasks and pipelines and expands expressions.
//! - [`run`] is the per-Run state machine.
//! - [`scheduler`] owns active Runs and turns events into ready tasks.
//! - [`task_info`] provides the scheduled task type.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod expr;
pub mod registry;
pub mod run;
pub mod scheduler;
pub mod scheduler_step;
pub mod task_info;

pub use expr::TaskExpr;
pub use registry::{Task, TaskRegistry};
pub use run::{LeafStatus, Run, RunReport, RunStatus};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{RunId, ScheduledTask};
