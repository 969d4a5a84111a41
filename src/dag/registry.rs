// src/dag/registry.rs

//! Named tasks and pipelines.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::{ConfigFile, TaskKind};
use crate::dag::expr::TaskExpr;
use crate::errors::{PipelineError, Result};
use crate::exec::action::{CleanAction, CommandAction, NoopAction, TaskAction, TransformAction};
use crate::fs::FileSystem;
use crate::transform::{TemplateData, TransformInvoker};
use crate::types::{parse_duration, TaskName};

/// A registered unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    action: Arc<dyn TaskAction>,
    predecessors: Vec<TaskName>,
    timeout: Option<Duration>,
    description: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, action: Arc<dyn TaskAction>) -> Self {
        Self {
            name: name.into(),
            action,
            predecessors: Vec::new(),
            timeout: None,
            description: None,
        }
    }

    /// Tasks that must finish (in parallel) before this one starts.
    pub fn after<I, S>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.predecessors = predecessors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Arc<dyn TaskAction> {
        &self.action
    }

    pub fn predecessors(&self) -> &[TaskName] {
        &self.predecessors
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Registry of tasks and pipelines sharing one namespace.
///
/// Built once at startup and then shared read-only (behind an `Arc`) by the
/// scheduler and the executor.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Task>,
    pipelines: BTreeMap<TaskName, TaskExpr>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.tasks.contains_key(name) || self.pipelines.contains_key(name) {
            return Err(PipelineError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Register a task. Fails with `DuplicateName` if the name is taken.
    pub fn register(&mut self, task: Task) -> Result<()> {
        self.ensure_free(&task.name)?;
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    /// Register a named pipeline. Same namespace rule as [`register`](Self::register).
    pub fn define(&mut self, name: impl Into<TaskName>, expr: TaskExpr) -> Result<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.pipelines.insert(name, expr);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| PipelineError::UnknownTask(name.to_string()))
    }

    pub fn pipeline(&self, name: &str) -> Option<&TaskExpr> {
        self.pipelines.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name) || self.pipelines.contains_key(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn pipelines(&self) -> impl Iterator<Item = (&TaskName, &TaskExpr)> {
        self.pipelines.iter()
    }

    /// Resolve an expression into one that references tasks only.
    ///
    /// - a pipeline name becomes its (expanded) expression;
    /// - a task `T` with predecessors `P1..Pn` becomes
    ///   `Sequence[Parallel[P1..Pn], T]`;
    /// - unknown names fail with `UnknownTask`, reference loops with `DagCycle`.
    pub fn expand(&self, expr: &TaskExpr) -> Result<TaskExpr> {
        let mut stack = Vec::new();
        self.expand_inner(expr, &mut stack)
    }

    fn expand_inner(&self, expr: &TaskExpr, stack: &mut Vec<TaskName>) -> Result<TaskExpr> {
        match expr {
            TaskExpr::Task(name) => {
                if stack.contains(name) {
                    let mut path = stack.clone();
                    path.push(name.clone());
                    return Err(PipelineError::DagCycle(path.join(" -> ")));
                }

                if let Some(pipeline) = self.pipelines.get(name) {
                    stack.push(name.clone());
                    let expanded = self.expand_inner(pipeline, stack);
                    stack.pop();
                    return expanded;
                }

                let task = self.lookup(name)?;
                if task.predecessors.is_empty() {
                    return Ok(TaskExpr::Task(name.clone()));
                }

                stack.push(name.clone());
                let preds = task
                    .predecessors
                    .iter()
                    .map(|p| self.expand_inner(&TaskExpr::Task(p.clone()), stack))
                    .collect::<Result<Vec<_>>>();
                stack.pop();

                Ok(TaskExpr::Sequence(vec![
                    TaskExpr::Parallel(preds?),
                    TaskExpr::Task(name.clone()),
                ]))
            }
            TaskExpr::Sequence(members) => Ok(TaskExpr::Sequence(
                members
                    .iter()
                    .map(|m| self.expand_inner(m, stack))
                    .collect::<Result<_>>()?,
            )),
            TaskExpr::Parallel(members) => Ok(TaskExpr::Parallel(
                members
                    .iter()
                    .map(|m| self.expand_inner(m, stack))
                    .collect::<Result<_>>()?,
            )),
        }
    }

    /// Build the registry described by a validated config.
    ///
    /// `root` is the project root all config paths are relative to.
    /// `template` transforms read `[data].file` through `fs` on every run.
    pub fn from_config(cfg: &ConfigFile, root: &Path, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let mut registry = TaskRegistry::new();
        let defaults = cfg.default_section();
        let data = match cfg.data_section().file.as_deref() {
            Some(file) => TemplateData::File(root.join(file)),
            None => TemplateData::default(),
        };

        for (name, tc) in cfg.tasks().iter() {
            let action: Arc<dyn TaskAction> = match tc.kind() {
                TaskKind::Command => {
                    let cmd = tc.cmd.as_deref().unwrap_or_default();
                    Arc::new(CommandAction::new(cmd, root))
                }
                TaskKind::Clean => {
                    let dir = tc.clean.as_deref().unwrap_or_default();
                    ensure_cleanable(name, dir)?;
                    Arc::new(CleanAction::new(root.join(dir), fs.clone()))
                }
                TaskKind::Transform => Arc::new(TransformAction::new(
                    TransformInvoker::from_task_config(
                        name,
                        tc,
                        &defaults.exclude,
                        root,
                        &data,
                        fs.clone(),
                    )?,
                )),
                TaskKind::Group => Arc::new(NoopAction),
            };

            let timeout = tc
                .effective_timeout(defaults.timeout.as_deref())
                .map(parse_duration)
                .transpose()
                .map_err(|e| PipelineError::ConfigError(format!("task '{name}': {e}")))?;

            registry.register(
                Task::new(name.clone(), action)
                    .after(tc.after.iter().cloned())
                    .with_timeout(timeout)
                    .with_description(tc.description.clone()),
            )?;
        }

        for (name, expr) in cfg.pipelines().iter() {
            registry.define(name.clone(), TaskExpr::from(expr))?;
        }

        Ok(registry)
    }
}

/// `clean` must name a directory strictly inside the project root.
fn ensure_cleanable(task: &str, dir: &str) -> Result<()> {
    let path = Path::new(dir);
    let inside = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)));
    if !inside {
        return Err(PipelineError::ConfigError(format!(
            "task '{task}' cannot clean '{dir}': path must be a directory inside the project root"
        )));
    }
    Ok(())
}
