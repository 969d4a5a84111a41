// src/dag/expr.rs

//! Composite task expressions.

use std::fmt;

use crate::config::model::ExprConfig;
use crate::types::TaskName;

/// A composition of tasks.
///
/// `Sequence` members run one after another and stop at the first failure;
/// `Parallel` members start together and are all awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExpr {
    Task(TaskName),
    Sequence(Vec<TaskExpr>),
    Parallel(Vec<TaskExpr>),
}

impl TaskExpr {
    pub fn task(name: impl Into<TaskName>) -> Self {
        TaskExpr::Task(name.into())
    }

    pub fn seq<I>(members: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TaskExpr>,
    {
        TaskExpr::Sequence(members.into_iter().map(Into::into).collect())
    }

    pub fn par<I>(members: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TaskExpr>,
    {
        TaskExpr::Parallel(members.into_iter().map(Into::into).collect())
    }

    /// Distinct task names referenced by this expression, in first-seen order.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TaskExpr::Task(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name.as_str());
                }
            }
            TaskExpr::Sequence(members) | TaskExpr::Parallel(members) => {
                for m in members {
                    m.collect_leaves(out);
                }
            }
        }
    }
}

impl From<&str> for TaskExpr {
    fn from(name: &str) -> Self {
        TaskExpr::Task(name.to_string())
    }
}

impl From<String> for TaskExpr {
    fn from(name: String) -> Self {
        TaskExpr::Task(name)
    }
}

impl From<&ExprConfig> for TaskExpr {
    fn from(cfg: &ExprConfig) -> Self {
        match cfg {
            ExprConfig::Name(name) => TaskExpr::Task(name.clone()),
            ExprConfig::Seq { seq } => TaskExpr::Sequence(seq.iter().map(TaskExpr::from).collect()),
            ExprConfig::Par { par } => TaskExpr::Parallel(par.iter().map(TaskExpr::from).collect()),
        }
    }
}

impl fmt::Display for TaskExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, members) = match self {
            TaskExpr::Task(name) => return f.write_str(name),
            TaskExpr::Sequence(members) => ("seq", members),
            TaskExpr::Parallel(members) => ("par", members),
        };
        write!(f, "{label}(")?;
        for (i, m) in members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{m}")?;
        }
        f.write_str(")")
    }
}
