// src/exec/mod.rs

//! Task execution layer.
//!
//! The engine decides *what* runs; this module actually runs it and reports
//! back to the runtime via `RuntimeEvent::TaskCompleted`.
//!
//! - [`action`] defines the `TaskAction` trait and the built-in actions
//!   (shell command, clean, transform, group).
//! - [`command`] runs shell commands and captures their output.
//! - [`executor_loop`] owns the background loop that spawns one Tokio task
//!   per scheduled task.
//! - [`task_runner`] runs a single scheduled task with its timeout.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` used in production; tests swap in a fake.

pub mod action;
pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod task_runner;

pub use action::{TaskAction, action_fn};
pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
