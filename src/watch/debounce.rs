// src/watch/debounce.rs

//! Per-binding debouncing of change events.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::watch::cache::{ContentCheck, ContentGate};
use crate::watch::patterns::WatchBinding;

/// Spawn the debouncer for one binding.
///
/// Paths sent to the returned channel are collected until no new path has
/// arrived for `window`; then a single `RuntimeEvent::BindingTriggered`
/// carrying every collected path is sent (trailing edge). Bindings with
/// `use_hash` consult `gate` first, stay silent when their watched content
/// is unchanged, and otherwise attach the new content hash for the runtime
/// to commit.
pub fn spawn_debouncer(
    binding: WatchBinding,
    window: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    gate: Option<Arc<ContentGate>>,
) -> mpsc::Sender<PathBuf> {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(256);

    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut pending = BTreeSet::from([first]);
            let mut closed = false;

            loop {
                match tokio::time::timeout(window, rx.recv()).await {
                    Ok(Some(path)) => {
                        pending.insert(path);
                    }
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            let paths: Vec<PathBuf> = pending.into_iter().collect();
            if !fire(&binding, paths, &runtime_tx, gate.as_ref()).await || closed {
                break;
            }
        }
        debug!(binding = %binding.name(), "debouncer finished");
    });

    tx
}

/// Returns false once the runtime is gone.
async fn fire(
    binding: &WatchBinding,
    paths: Vec<PathBuf>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    gate: Option<&Arc<ContentGate>>,
) -> bool {
    let mut content_hash = None;
    if let Some(gate) = gate.filter(|_| binding.use_hash()) {
        let gate = Arc::clone(gate);
        let b = binding.clone();
        let p = paths.clone();
        let check = tokio::task::spawn_blocking(move || gate.check(&b, &p))
            .await
            .unwrap_or(ContentCheck::Unknown);
        if !check.should_fire() {
            return true;
        }
        content_hash = check.into_hash();
    }

    debug!(binding = %binding.name(), paths = paths.len(), "debounce window elapsed; triggering");
    if runtime_tx
        .send(RuntimeEvent::BindingTriggered {
            binding: binding.name().to_string(),
            paths,
            content_hash,
        })
        .await
        .is_err()
    {
        warn!(binding = %binding.name(), "runtime stopped; dropping trigger");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskExpr;

    fn binding() -> WatchBinding {
        WatchBinding::new("styles", &["src/**/*.css".to_string()], &[], TaskExpr::task("css"))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_inside_window_triggers_once_with_all_paths() {
        let (rt_tx, mut rt_rx) = mpsc::channel(8);
        let tx = spawn_debouncer(binding(), Duration::from_millis(50), rt_tx, None);

        for name in ["src/b.css", "src/a.css", "src/b.css", "src/c.css"] {
            tx.send(PathBuf::from(name)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        match rt_rx.recv().await.unwrap() {
            RuntimeEvent::BindingTriggered { binding, paths, content_hash } => {
                assert_eq!(binding, "styles");
                assert_eq!(content_hash, None);
                assert_eq!(
                    paths,
                    vec![
                        PathBuf::from("src/a.css"),
                        PathBuf::from("src/b.css"),
                        PathBuf::from("src/c.css"),
                    ]
                );
            }
            other => panic!("unexpected event {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rt_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn changes_separated_by_quiet_period_trigger_separately() {
        let (rt_tx, mut rt_rx) = mpsc::channel(8);
        let tx = spawn_debouncer(binding(), Duration::from_millis(50), rt_tx, None);

        tx.send(PathBuf::from("src/a.css")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(PathBuf::from("src/b.css")).await.unwrap();

        for expected in ["src/a.css", "src/b.css"] {
            match rt_rx.recv().await.unwrap() {
                RuntimeEvent::BindingTriggered { paths, .. } => {
                    assert_eq!(paths, vec![PathBuf::from(expected)]);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gated_binding_attaches_hash_and_skips_unchanged_content() {
        use crate::fs::mock::MockFileSystem;
        use crate::watch::hash::MemoryHashStore;

        let fs = MockFileSystem::new();
        fs.add_file("./src/a.css", "v1");
        let gate = Arc::new(ContentGate::new(
            Arc::new(fs.clone()),
            ".",
            Box::new(MemoryHashStore::new()),
        ));
        let b = binding().with_use_hash(true);
        gate.seed(&b);

        let (rt_tx, mut rt_rx) = mpsc::channel(8);
        let tx = spawn_debouncer(b, Duration::from_millis(50), rt_tx, Some(gate.clone()));

        // Touched without changes: nothing fires.
        tx.send(PathBuf::from("src/a.css")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rt_rx.try_recv().is_err());

        fs.add_file("./src/a.css", "v2");
        tx.send(PathBuf::from("src/a.css")).await.unwrap();
        match rt_rx.recv().await.unwrap() {
            RuntimeEvent::BindingTriggered { content_hash, .. } => assert!(content_hash.is_some()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
