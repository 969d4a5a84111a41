// src/dag/run.rs

//! Per-Run state machine for one expanded task expression.
//!
//! The expression is flattened into an arena of nodes. A node is `Idle`
//! until its parent activates it, `Active` while it waits on work, and
//! `Done` once terminal. Leaves are keyed by task name: a task referenced
//! several times in one Run executes once and every reference shares the
//! result.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::dag::expr::TaskExpr;
use crate::dag::task_info::RunId;
use crate::engine::TaskOutcome;
use crate::types::TaskName;

/// Status of one leaf task within a Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because an enclosing Sequence failed first.
    Skipped,
}

impl LeafStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeafStatus::Succeeded | LeafStatus::Failed | LeafStatus::Skipped
        )
    }
}

impl fmt::Display for LeafStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeafStatus::Pending => "pending",
            LeafStatus::Running => "running",
            LeafStatus::Succeeded => "succeeded",
            LeafStatus::Failed => "failed",
            LeafStatus::Skipped => "skipped",
        };
        f.pad(s)
    }
}

/// Overall status: failed as soon as any leaf failed, succeeded once every
/// leaf succeeded, running otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(TaskName),
    Sequence(Vec<usize>),
    Parallel(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Idle,
    Active,
    Done { ok: bool },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<usize>,
    state: NodeState,
    /// Sequence: index of the member currently running.
    cursor: usize,
    /// Parallel: members not yet terminal.
    remaining: usize,
    any_failed: bool,
}

/// Leaves started and failed by one transition.
#[derive(Debug, Default)]
pub(crate) struct Transition {
    pub started: Vec<TaskName>,
    pub failed: Vec<TaskName>,
}

/// One execution of an expression.
#[derive(Debug)]
pub struct Run {
    id: RunId,
    target: String,
    nodes: Vec<Node>,
    root: usize,
    leaf_order: Vec<TaskName>,
    leaves: HashMap<TaskName, LeafStatus>,
    errors: Vec<(TaskName, String)>,
    started_order: Vec<TaskName>,
    started_at: Instant,
}

impl Run {
    /// Create a Run for an expanded (leaf-only) expression and activate its
    /// root. Returns the Run and the leaves to dispatch right away.
    pub(crate) fn start(id: RunId, target: impl Into<String>, expr: &TaskExpr) -> (Self, Vec<TaskName>) {
        let mut run = Run {
            id,
            target: target.into(),
            nodes: Vec::new(),
            root: 0,
            leaf_order: Vec::new(),
            leaves: HashMap::new(),
            errors: Vec::new(),
            started_order: Vec::new(),
            started_at: Instant::now(),
        };
        run.root = run.build(expr, None);

        let mut started = Vec::new();
        run.activate(run.root, &mut started);
        run.finalize_if_done();
        (run, started)
    }

    fn build(&mut self, expr: &TaskExpr, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Sequence(Vec::new()),
            parent,
            state: NodeState::Idle,
            cursor: 0,
            remaining: 0,
            any_failed: false,
        });

        let kind = match expr {
            TaskExpr::Task(name) => {
                if !self.leaves.contains_key(name) {
                    self.leaf_order.push(name.clone());
                    self.leaves.insert(name.clone(), LeafStatus::Pending);
                }
                NodeKind::Leaf(name.clone())
            }
            TaskExpr::Sequence(members) => {
                NodeKind::Sequence(members.iter().map(|m| self.build(m, Some(idx))).collect())
            }
            TaskExpr::Parallel(members) => {
                NodeKind::Parallel(members.iter().map(|m| self.build(m, Some(idx))).collect())
            }
        };
        self.nodes[idx].kind = kind;
        idx
    }

    fn activate(&mut self, idx: usize, started: &mut Vec<TaskName>) {
        self.nodes[idx].state = NodeState::Active;

        match self.nodes[idx].kind.clone() {
            NodeKind::Leaf(name) => match self.leaves.get(&name).copied() {
                Some(LeafStatus::Pending) => {
                    self.leaves.insert(name.clone(), LeafStatus::Running);
                    self.started_order.push(name.clone());
                    started.push(name);
                }
                Some(LeafStatus::Succeeded) => self.finish(idx, true, started),
                Some(LeafStatus::Failed) => self.finish(idx, false, started),
                // Already running for another reference; completes with it.
                _ => {}
            },
            NodeKind::Sequence(children) => match children.first() {
                Some(&first) => {
                    self.nodes[idx].cursor = 0;
                    self.activate(first, started);
                }
                None => self.finish(idx, true, started),
            },
            NodeKind::Parallel(children) => {
                if children.is_empty() {
                    self.finish(idx, true, started);
                    return;
                }
                self.nodes[idx].remaining = children.len();
                for child in children {
                    self.activate(child, started);
                }
            }
        }
    }

    fn finish(&mut self, idx: usize, ok: bool, started: &mut Vec<TaskName>) {
        self.nodes[idx].state = NodeState::Done { ok };
        if let Some(parent) = self.nodes[idx].parent {
            self.child_done(parent, ok, started);
        }
    }

    fn child_done(&mut self, parent: usize, ok: bool, started: &mut Vec<TaskName>) {
        if self.nodes[parent].state != NodeState::Active {
            return;
        }

        match self.nodes[parent].kind.clone() {
            NodeKind::Sequence(children) => {
                if !ok {
                    self.finish(parent, false, started);
                    return;
                }
                let next = self.nodes[parent].cursor + 1;
                self.nodes[parent].cursor = next;
                match children.get(next) {
                    Some(&child) => self.activate(child, started),
                    None => self.finish(parent, true, started),
                }
            }
            NodeKind::Parallel(_) => {
                let node = &mut self.nodes[parent];
                node.any_failed |= !ok;
                node.remaining = node.remaining.saturating_sub(1);
                if node.remaining == 0 {
                    let ok = !node.any_failed;
                    self.finish(parent, ok, started);
                }
            }
            NodeKind::Leaf(_) => {}
        }
    }

    /// Record the outcome of a running leaf and propagate it.
    ///
    /// Completions for leaves that are not running in this Run are ignored.
    pub(crate) fn complete(&mut self, task: &str, outcome: &TaskOutcome) -> Transition {
        let mut transition = Transition::default();
        if self.leaves.get(task) != Some(&LeafStatus::Running) {
            return transition;
        }

        let ok = match outcome {
            TaskOutcome::Success => true,
            TaskOutcome::Failed(message) => {
                self.errors.push((task.to_string(), message.clone()));
                transition.failed.push(task.to_string());
                false
            }
        };
        let status = if ok {
            LeafStatus::Succeeded
        } else {
            LeafStatus::Failed
        };
        self.leaves.insert(task.to_string(), status);

        let waiting: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                n.state == NodeState::Active && matches!(&n.kind, NodeKind::Leaf(name) if name == task)
            })
            .map(|(i, _)| i)
            .collect();

        for idx in waiting {
            // An earlier finish may already have settled this node.
            if self.nodes[idx].state == NodeState::Active {
                self.finish(idx, ok, &mut transition.started);
            }
        }

        self.finalize_if_done();
        transition
    }

    fn finalize_if_done(&mut self) {
        if !self.is_finished() {
            return;
        }
        for status in self.leaves.values_mut() {
            if *status == LeafStatus::Pending {
                *status = LeafStatus::Skipped;
            }
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True once the root expression is terminal.
    pub fn is_finished(&self) -> bool {
        matches!(self.nodes[self.root].state, NodeState::Done { .. })
    }

    pub fn status(&self) -> RunStatus {
        if self.leaves.values().any(|s| *s == LeafStatus::Failed) {
            RunStatus::Failed
        } else if self.is_finished() {
            RunStatus::Succeeded
        } else {
            RunStatus::Running
        }
    }

    pub fn leaf_status(&self, task: &str) -> Option<LeafStatus> {
        self.leaves.get(task).copied()
    }

    /// Leaves currently executing.
    pub fn running(&self) -> Vec<&str> {
        self.leaf_order
            .iter()
            .filter(|n| self.leaves.get(*n) == Some(&LeafStatus::Running))
            .map(|n| n.as_str())
            .collect()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.id,
            target: self.target.clone(),
            status: self.status(),
            leaves: self
                .leaf_order
                .iter()
                .map(|n| (n.clone(), self.leaves.get(n).copied().unwrap_or(LeafStatus::Pending)))
                .collect(),
            errors: self.errors.clone(),
            started_order: self.started_order.clone(),
            elapsed: self.started_at.elapsed(),
        }
    }
}

/// Snapshot of a Run, produced when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: String,
    pub status: RunStatus,
    /// Every leaf, in first-reference order.
    pub leaves: Vec<(TaskName, LeafStatus)>,
    /// Failure messages, in completion order.
    pub errors: Vec<(TaskName, String)>,
    /// Leaves in the order they were dispatched.
    pub started_order: Vec<TaskName>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn leaf(&self, name: &str) -> Option<LeafStatus> {
        self.leaves
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    fn with_status(&self, status: LeafStatus) -> Vec<TaskName> {
        self.leaves
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<TaskName> {
        self.with_status(LeafStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<TaskName> {
        self.with_status(LeafStatus::Skipped)
    }
}
