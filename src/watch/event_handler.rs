// src/watch/event_handler.rs

//! Routing of filesystem events to watch bindings.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::watch::path_utils::relative_str;
use crate::watch::patterns::WatchBinding;

/// A binding together with the input side of its debouncer.
#[derive(Debug, Clone)]
pub struct BindingRoute {
    pub binding: WatchBinding,
    pub debouncer: mpsc::Sender<PathBuf>,
}

/// Whether an event kind can change a file's content or existence.
pub fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// Forward every path of `event` to the debouncers of the bindings it
/// matches. Returns how many (path, binding) pairs were forwarded.
pub async fn route_event(root: &Path, event: Event, routes: &[BindingRoute]) -> usize {
    if !is_relevant(&event.kind) {
        trace!(kind = ?event.kind, "ignoring event kind");
        return 0;
    }

    let mut forwarded = 0;
    for path in event.paths {
        forwarded += route_path(root, &path, routes).await;
    }
    forwarded
}

/// Forward one changed path. Paths outside `root` are ignored.
pub async fn route_path(root: &Path, path: &Path, routes: &[BindingRoute]) -> usize {
    let Some(rel) = relative_str(root, path) else {
        warn!(
            "could not relativize path {:?} against root {:?}",
            path, root
        );
        return 0;
    };

    let mut forwarded = 0;
    for route in routes.iter().filter(|r| r.binding.matches(&rel)) {
        debug!(binding = %route.binding.name(), path = %rel, "watch match");
        if route.debouncer.send(PathBuf::from(&rel)).await.is_ok() {
            forwarded += 1;
        }
    }
    forwarded
}
