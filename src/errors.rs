// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::TaskName;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task or pipeline '{0}' is already registered")]
    DuplicateName(TaskName),

    #[error("Unknown task or pipeline: {0}")]
    UnknownTask(TaskName),

    #[error("Cycle detected: {0}")]
    DagCycle(String),

    /// A leaf task's transformation failed on one or more inputs.
    #[error("task '{task}' failed on {}: {message}", display_paths(.paths))]
    Transform {
        task: TaskName,
        paths: Vec<PathBuf>,
        message: String,
    },

    #[error("Filesystem error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("task '{task}' timed out after {after:?}")]
    Timeout { task: TaskName, after: Duration },

    #[error("run of '{target}' failed: {failed:?}")]
    RunFailed {
        target: String,
        failed: Vec<TaskName>,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Build a `Transform` error for a single input path.
    pub fn transform(task: impl Into<TaskName>, path: impl Into<PathBuf>, message: impl ToString) -> Self {
        PipelineError::Transform {
            task: task.into(),
            paths: vec![path.into()],
            message: message.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<no input>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_names_task_and_inputs() {
        let err = PipelineError::Transform {
            task: "scss".to_string(),
            paths: vec![PathBuf::from("src/a.scss"), PathBuf::from("src/broken.scss")],
            message: "unexpected token".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("scss"));
        assert!(msg.contains("src/broken.scss"));
        assert!(msg.contains("src/a.scss"));
    }
}
