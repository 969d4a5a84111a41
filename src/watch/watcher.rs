// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::RuntimeEvent;
use crate::watch::cache::ContentGate;
use crate::watch::debounce::spawn_debouncer;
use crate::watch::event_handler::{BindingRoute, route_event};
use crate::watch::patterns::WatchBinding;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `root` recursively and send debounced
/// `RuntimeEvent::BindingTriggered` events for the bindings whose patterns
/// match changed paths.
///
/// - `root` is the project root all glob patterns are relative to.
/// - `debounce` is the quiet period per binding.
/// - `gate` filters `use_hash` bindings; without it they always fire. Their
///   current content is seeded into the gate before watching starts.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    bindings: Vec<WatchBinding>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    debounce: Duration,
    gate: Option<Arc<ContentGate>>,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or(root);

    if let Some(gate) = &gate {
        let names: Vec<&str> = bindings.iter().map(|b| b.name()).collect();
        gate.prune(&names);
        for binding in bindings.iter().filter(|b| b.use_hash()) {
            gate.seed(binding);
        }
    }

    let routes: Vec<BindingRoute> = bindings
        .into_iter()
        .map(|binding| BindingRoute {
            debouncer: spawn_debouncer(binding.clone(), debounce, runtime_tx.clone(), gate.clone()),
            binding,
        })
        .collect();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch event loop gone; dropping notify event");
                }
            }
            Err(err) => {
                error!(error = %err, "file watch error");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(root = ?root, bindings = routes.len(), "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            route_event(&root, event, &routes).await;
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
