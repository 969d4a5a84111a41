// src/engine/queue.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::debug;

use crate::dag::{RunId, TaskExpr};
use crate::types::TriggerWhileRunningBehaviour;

/// What a watch binding runs, as seen by the core runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub name: String,
    pub expr: TaskExpr,
    /// Notify live-reload clients when the binding's Run finishes.
    pub reload: bool,
}

/// What to do with a binding trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Start a Run of the binding's expression now.
    Start {
        expr: TaskExpr,
        paths: Vec<PathBuf>,
        content_hash: Option<String>,
    },
    /// The binding's Run is active; the paths were queued for a follow-up Run.
    Queued,
    /// The binding's Run is active and the trigger was dropped.
    Skipped,
    /// No binding with that name.
    Unknown,
}

/// A follow-up Run waiting for the binding's active Run to finish.
#[derive(Debug, Default)]
struct Pending {
    paths: BTreeSet<PathBuf>,
    /// Latest content hash seen while queued.
    content_hash: Option<String>,
}

/// A queued follow-up handed back when the active Run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub expr: TaskExpr,
    pub paths: Vec<PathBuf>,
    pub content_hash: Option<String>,
}

#[derive(Debug)]
struct BindingState {
    spec: BindingSpec,
    active_run: Option<RunId>,
    pending: Option<Pending>,
}

/// Per-binding record of the active Run and of triggers that arrived while
/// it was running.
///
/// Bindings are independent: each has at most one active Run and at most
/// one queued follow-up, whose changed paths are the union of every trigger
/// received meanwhile.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    bindings: BTreeMap<String, BindingState>,
}

impl TriggerQueue {
    pub fn new(behaviour: TriggerWhileRunningBehaviour, specs: Vec<BindingSpec>) -> Self {
        let bindings = specs
            .into_iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    BindingState {
                        spec,
                        active_run: None,
                        pending: None,
                    },
                )
            })
            .collect();
        Self {
            behaviour,
            bindings,
        }
    }

    /// Returns the configured behaviour.
    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Returns true if no binding has a queued follow-up Run.
    pub fn is_empty(&self) -> bool {
        self.bindings.values().all(|b| b.pending.is_none())
    }

    pub fn spec(&self, binding: &str) -> Option<&BindingSpec> {
        self.bindings.get(binding).map(|b| &b.spec)
    }

    /// Decide what a trigger of `binding` with `paths` changed should do.
    ///
    /// `content_hash` travels with the trigger: it comes back in `Start`,
    /// or is kept with the queued follow-up. A skipped trigger drops it.
    pub fn on_trigger(
        &mut self,
        binding: &str,
        paths: Vec<PathBuf>,
        content_hash: Option<String>,
    ) -> TriggerDecision {
        let behaviour = self.behaviour;
        let Some(state) = self.bindings.get_mut(binding) else {
            return TriggerDecision::Unknown;
        };

        if state.active_run.is_none() {
            return TriggerDecision::Start {
                expr: state.spec.expr.clone(),
                paths,
                content_hash,
            };
        }

        match behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                let pending = state.pending.get_or_insert_with(Pending::default);
                pending.paths.extend(paths);
                if content_hash.is_some() {
                    pending.content_hash = content_hash;
                }
                debug!(
                    binding = %binding,
                    queued_paths = pending.paths.len(),
                    "binding run active; queued follow-up run"
                );
                TriggerDecision::Queued
            }
            TriggerWhileRunningBehaviour::Skip => {
                debug!(binding = %binding, "binding run active; skipping trigger");
                TriggerDecision::Skipped
            }
        }
    }

    pub fn run_started(&mut self, binding: &str, run_id: RunId) {
        if let Some(state) = self.bindings.get_mut(binding) {
            state.active_run = Some(run_id);
        }
    }

    /// Forget every queued follow-up. Returns how many were dropped.
    pub fn drop_pending(&mut self) -> usize {
        self.bindings
            .values_mut()
            .filter_map(|b| b.pending.take())
            .count()
    }

    /// Mark the binding's Run as finished. Returns the queued follow-up, if
    /// any, which the caller should start.
    pub fn run_finished(&mut self, binding: &str) -> Option<FollowUp> {
        let state = self.bindings.get_mut(binding)?;
        state.active_run = None;
        let pending = state.pending.take()?;
        Some(FollowUp {
            expr: state.spec.expr.clone(),
            paths: pending.paths.into_iter().collect(),
            content_hash: pending.content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(behaviour: TriggerWhileRunningBehaviour) -> TriggerQueue {
        TriggerQueue::new(
            behaviour,
            vec![BindingSpec {
                name: "css".into(),
                expr: TaskExpr::task("css"),
                reload: true,
            }],
        )
    }

    fn paths(p: &[&str]) -> Vec<PathBuf> {
        p.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn queue_mode_merges_paths_into_one_follow_up() {
        let mut q = queue(TriggerWhileRunningBehaviour::Queue);
        assert!(matches!(
            q.on_trigger("css", paths(&["a.css"]), None),
            TriggerDecision::Start { .. }
        ));
        q.run_started("css", 1);

        assert_eq!(
            q.on_trigger("css", paths(&["b.css"]), Some("h1".into())),
            TriggerDecision::Queued
        );
        assert_eq!(
            q.on_trigger("css", paths(&["c.css", "b.css"]), Some("h2".into())),
            TriggerDecision::Queued
        );
        assert!(!q.is_empty());

        let follow_up = q.run_finished("css").unwrap();
        assert_eq!(follow_up.expr, TaskExpr::task("css"));
        assert_eq!(follow_up.paths, paths(&["b.css", "c.css"]));
        assert_eq!(follow_up.content_hash.as_deref(), Some("h2"));
        assert!(q.is_empty());
        assert!(q.run_finished("css").is_none());
    }

    #[test]
    fn skip_mode_drops_triggers_while_running() {
        let mut q = queue(TriggerWhileRunningBehaviour::Skip);
        q.run_started("css", 1);
        assert_eq!(
            q.on_trigger("css", paths(&["a.css"]), Some("h1".into())),
            TriggerDecision::Skipped
        );
        assert!(q.run_finished("css").is_none());
        assert!(matches!(
            q.on_trigger("css", vec![], Some("h1".into())),
            TriggerDecision::Start { content_hash: Some(h), .. } if h == "h1"
        ));
    }

    #[test]
    fn unknown_binding() {
        let mut q = queue(TriggerWhileRunningBehaviour::Queue);
        assert_eq!(q.on_trigger("js", vec![], None), TriggerDecision::Unknown);
    }
}
