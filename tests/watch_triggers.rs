// tests/watch_triggers.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use assetpipe::dag::{Scheduler, Task, TaskExpr, TaskRegistry};
use assetpipe::engine::{BindingSpec, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use assetpipe::exec::action::NoopAction;
use assetpipe::fs::RealFileSystem;
use assetpipe::types::TriggerWhileRunningBehaviour;
use assetpipe::watch::{
    ContentGate, MemoryHashStore, WatchBinding, spawn_debouncer, spawn_watcher,
};
use assetpipe_test_utils::fake_executor::FakeExecutor;
use assetpipe_test_utils::{init_tracing, with_timeout};
use assetpipe_test_utils::tree::write_tree;

fn styles_binding() -> WatchBinding {
    WatchBinding::new(
        "styles",
        &["src/css/**/*.css".to_string()],
        &["**/*.tmp.css".to_string()],
        TaskExpr::task("css"),
    )
    .unwrap()
}

async fn next_trigger(rx: &mut mpsc::Receiver<RuntimeEvent>, within: Duration) -> Option<Vec<PathBuf>> {
    loop {
        match tokio::time::timeout(within, rx.recv()).await {
            Ok(Some(RuntimeEvent::BindingTriggered { paths, .. })) => return Some(paths),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn many_rapid_changes_trigger_exactly_one_run() {
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let debouncer = spawn_debouncer(styles_binding(), Duration::from_millis(50), rt_tx, None);

    for i in 0..20 {
        debouncer
            .send(PathBuf::from(format!("src/css/f{}.css", i % 3)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let paths = next_trigger(&mut rt_rx, Duration::from_secs(1)).await.unwrap();
    assert_eq!(paths.len(), 3);
    assert!(next_trigger(&mut rt_rx, Duration::from_secs(1)).await.is_none());
}

#[tokio::test]
async fn real_file_change_reaches_matching_binding_only() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("src/css/site.css", "a"), ("src/js/app.js", "a")]);

    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _handle = spawn_watcher(
        dir.path(),
        vec![styles_binding()],
        rt_tx,
        Duration::from_millis(50),
        None,
    )
    .unwrap();

    // Give the platform watcher a moment to register.
    tokio::time::sleep(Duration::from_millis(200)).await;

    write_tree(dir.path(), &[("src/js/app.js", "b"), ("src/css/x.tmp.css", "b")]);
    assert!(next_trigger(&mut rt_rx, Duration::from_millis(500)).await.is_none());

    write_tree(dir.path(), &[("src/css/site.css", "b")]);
    let paths = next_trigger(&mut rt_rx, Duration::from_secs(5)).await.unwrap();
    assert!(paths.contains(&PathBuf::from("src/css/site.css")), "{paths:?}");
}

async fn next_hashed_trigger(
    rx: &mut mpsc::Receiver<RuntimeEvent>,
    within: Duration,
) -> Option<Option<String>> {
    match tokio::time::timeout(within, rx.recv()).await {
        Ok(Some(RuntimeEvent::BindingTriggered { content_hash, .. })) => Some(content_hash),
        _ => None,
    }
}

#[tokio::test]
async fn use_hash_binding_ignores_identical_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("src/css/site.css", "body {}")]);

    let gate = Arc::new(ContentGate::new(
        Arc::new(RealFileSystem),
        dir.path(),
        Box::new(MemoryHashStore::new()),
    ));
    let binding = styles_binding().with_use_hash(true);
    gate.seed(&binding);

    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let debouncer = spawn_debouncer(binding, Duration::from_millis(20), rt_tx, Some(gate.clone()));
    let changed = PathBuf::from("src/css/site.css");

    // Touched right after startup with the seeded content.
    write_tree(dir.path(), &[("src/css/site.css", "body {}")]);
    debouncer.send(changed.clone()).await.unwrap();
    assert!(next_trigger(&mut rt_rx, Duration::from_millis(300)).await.is_none());

    write_tree(dir.path(), &[("src/css/site.css", "body { color: red }")]);
    debouncer.send(changed.clone()).await.unwrap();
    let hash = next_hashed_trigger(&mut rt_rx, Duration::from_secs(2))
        .await
        .unwrap()
        .expect("changed content carries its hash");
    gate.commit("styles", &hash).unwrap();

    write_tree(dir.path(), &[("src/css/site.css", "body { color: red }")]);
    debouncer.send(changed).await.unwrap();
    assert!(next_trigger(&mut rt_rx, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn skipped_trigger_does_not_swallow_the_edit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("src/css/site.css", "v1")]);

    let gate = Arc::new(ContentGate::new(
        Arc::new(RealFileSystem),
        dir.path(),
        Box::new(MemoryHashStore::new()),
    ));
    let binding = styles_binding().with_use_hash(true);
    let changed = vec![PathBuf::from("src/css/site.css")];

    let first = gate.check(&binding, &changed).into_hash();
    write_tree(dir.path(), &[("src/css/site.css", "v2")]);
    let second = gate.check(&binding, &changed).into_hash();
    assert!(first.is_some() && second.is_some() && first != second);

    let mut reg = TaskRegistry::new();
    reg.register(Task::new("css", Arc::new(NoopAction))).unwrap();
    let core = CoreRuntime::new(
        Scheduler::new(Arc::new(reg)),
        TriggerWhileRunningBehaviour::Skip,
        vec![BindingSpec {
            name: "styles".into(),
            expr: TaskExpr::task("css"),
            reload: false,
        }],
        RuntimeOptions::default(),
    );

    // Both triggers are queued before the first completion, so the second
    // arrives while the Run is active and is skipped.
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(16);
    for hash in [first, second] {
        tx.send(RuntimeEvent::BindingTriggered {
            binding: "styles".into(),
            paths: changed.clone(),
            content_hash: hash,
        })
        .await
        .unwrap();
    }
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();

    let executor = FakeExecutor::new(tx.clone());
    let log = executor.dispatched();
    let summary = with_timeout(
        Runtime::new(core, rx, executor)
            .with_content_gate(Some(gate.clone()))
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(summary.completed_runs, 1);
    assert_eq!(FakeExecutor::names(&log), vec!["css"]);
    // v2 was never built, so saving it again must still fire.
    assert!(gate.check(&binding, &changed).should_fire());
}
