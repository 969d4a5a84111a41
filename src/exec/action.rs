// src/exec/action.rs

//! Task actions: what a leaf task actually does when the executor runs it.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::exec::command::run_shell;
use crate::fs::{FileSystem, blocking};
use crate::transform::TransformInvoker;

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// The unit of work behind a registered task.
///
/// Actions return a future instead of taking a completion callback; the
/// executor awaits it and reports the outcome to the scheduler.
pub trait TaskAction: Send + Sync + fmt::Debug {
    fn run<'a>(&'a self, task: &'a str) -> ActionFuture<'a>;

    /// Short human-readable description for `--list` and logs.
    fn describe(&self) -> String;
}

/// Group task: only its predecessors do any work.
#[derive(Debug, Clone, Default)]
pub struct NoopAction;

impl TaskAction for NoopAction {
    fn run<'a>(&'a self, _task: &'a str) -> ActionFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn describe(&self) -> String {
        "group".to_string()
    }
}

/// Runs a shell command in the project root; success means exit code 0.
#[derive(Debug, Clone)]
pub struct CommandAction {
    cmd: String,
    cwd: PathBuf,
}

impl CommandAction {
    pub fn new(cmd: impl Into<String>, cwd: &Path) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.to_path_buf(),
        }
    }
}

impl TaskAction for CommandAction {
    fn run<'a>(&'a self, task: &'a str) -> ActionFuture<'a> {
        Box::pin(async move {
            let out = run_shell(&self.cmd, &self.cwd, None).await?;

            for line in String::from_utf8_lossy(&out.stdout).lines() {
                info!(task = %task, "{}", line);
            }
            for line in String::from_utf8_lossy(&out.stderr).lines() {
                debug!(task = %task, "stderr: {}", line);
            }

            if out.success() {
                Ok(())
            } else {
                Err(PipelineError::Other(anyhow!(
                    "`{}` exited with code {}: {}",
                    self.cmd,
                    out.exit_code,
                    out.stderr_tail()
                )))
            }
        })
    }

    fn describe(&self) -> String {
        format!("cmd: {}", self.cmd)
    }
}

/// Recursively removes a directory. A missing directory counts as success.
#[derive(Debug, Clone)]
pub struct CleanAction {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl CleanAction {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }
}

impl TaskAction for CleanAction {
    fn run<'a>(&'a self, task: &'a str) -> ActionFuture<'a> {
        Box::pin(async move {
            let fs = Arc::clone(&self.fs);
            let dir = self.dir.clone();
            blocking(move || fs.remove_dir_all(&dir)).await?;
            info!(task = %task, dir = %self.dir.display(), "removed directory");
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("clean: {}", self.dir.display())
    }
}

/// Runs a [`TransformInvoker`].
#[derive(Debug)]
pub struct TransformAction {
    invoker: TransformInvoker,
}

impl TransformAction {
    pub fn new(invoker: TransformInvoker) -> Self {
        Self { invoker }
    }
}

impl TaskAction for TransformAction {
    fn run<'a>(&'a self, _task: &'a str) -> ActionFuture<'a> {
        Box::pin(async move {
            self.invoker.invoke().await?;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("transform: {}", self.invoker.summary())
    }
}

/// Action backed by an async closure. Handy for embedding and tests.
pub struct FnAction<F> {
    f: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAction")
    }
}

impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn run<'a>(&'a self, _task: &'a str) -> ActionFuture<'a> {
        Box::pin((self.f)())
    }

    fn describe(&self) -> String {
        "fn".to_string()
    }
}

/// Wrap an async closure as a shareable action.
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn TaskAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnAction { f })
}
