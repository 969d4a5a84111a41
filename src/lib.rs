// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod reload;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, SERVE_TARGET, WATCH_TARGET};
use crate::config::model::ConfigFile;
use crate::config::{config_root_dir, load_and_validate, load_template_data};
use crate::dag::{RunReport, Scheduler, TaskExpr, TaskRegistry};
use crate::engine::{
    BindingSpec, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, run_expression,
};
use crate::errors::{PipelineError, Result};
use crate::exec::RealExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::reload::{StaticServer, WsReloadServer};
use crate::watch::{ContentGate, build_bindings_from_config, hash_store_for, spawn_watcher};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and template data loading
/// - the task registry
/// - one-shot targets, or for `watch` / `serve`:
///   scheduler, trigger queue, runtime, executor, file watcher, reload
///   server and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);
    // Fail before running anything; template tasks re-read the file per run.
    load_template_data(&cfg, &root)?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = Arc::new(TaskRegistry::from_config(&cfg, &root, fs.clone())?);

    if args.list {
        print_list(&cfg, &registry);
        return Ok(());
    }

    match args.target.as_str() {
        WATCH_TARGET => run_session(&cfg, &root, registry, fs, args.dry_run, false).await,
        SERVE_TARGET => run_session(&cfg, &root, registry, fs, args.dry_run, true).await,
        target => run_target(registry, target, args.dry_run).await,
    }
}

/// Run a single task or pipeline to completion.
async fn run_target(registry: Arc<TaskRegistry>, target: &str, dry_run: bool) -> Result<()> {
    let expr = TaskExpr::task(target);

    if dry_run {
        println!("{target} = {}", registry.expand(&expr)?);
        return Ok(());
    }

    let report = run_expression(registry, target, expr).await?;
    print_report(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(PipelineError::RunFailed {
            target: target.to_string(),
            failed: report.failed(),
        })
    }
}

/// `watch` and `serve`: run until Ctrl-C.
async fn run_session(
    cfg: &ConfigFile,
    root: &Path,
    registry: Arc<TaskRegistry>,
    fs: Arc<dyn FileSystem>,
    dry_run: bool,
    serve: bool,
) -> Result<()> {
    let bindings = build_bindings_from_config(cfg)?;
    for binding in bindings.iter() {
        registry.expand(binding.expr())?;
    }

    let serve_cfg = cfg.serve_section();
    let build_expr = TaskExpr::from(&serve_cfg.build);
    if serve {
        registry.expand(&build_expr)?;
    }

    if dry_run {
        if serve {
            println!("{SERVE_TARGET} = {}", registry.expand(&build_expr)?);
        }
        for binding in bindings.iter() {
            println!("watch.{} = {}", binding.name(), registry.expand(binding.expr())?);
        }
        return Ok(());
    }

    if bindings.is_empty() {
        warn!("no [watch.<name>] bindings configured; nothing will be rebuilt on change");
    }

    let section = cfg.config_section();
    let specs: Vec<BindingSpec> = bindings
        .iter()
        .map(|b| BindingSpec {
            name: b.name().to_string(),
            expr: b.expr().clone(),
            reload: b.reload(),
        })
        .collect();

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = RealExecutorBackend::new(registry.clone(), rt_tx.clone());

    let gate = bindings.iter().any(|b| b.use_hash()).then(|| {
        Arc::new(ContentGate::new(
            fs.clone(),
            root,
            hash_store_for(section.hash_storage_mode, root, fs.clone()),
        ))
    });

    let _watcher_handle = spawn_watcher(
        root,
        bindings,
        rt_tx.clone(),
        Duration::from_millis(section.debounce_ms),
        gate.clone(),
    )?;

    let core = CoreRuntime::new(
        Scheduler::new(registry),
        section.triggered_while_running_behaviour,
        specs,
        RuntimeOptions::default(),
    );
    let mut runtime = Runtime::new(core, rt_rx, executor).with_content_gate(gate);

    let mut _static_server = None;
    if serve {
        let server = Arc::new(WsReloadServer::start(&serve_cfg.host, serve_cfg.port).await?);
        info!(
            url = %format!("ws://{}", server.local_addr()),
            "live-reload clients can connect"
        );
        let files = StaticServer::start(
            &serve_cfg.host,
            serve_cfg.http_port,
            &root.join(&serve_cfg.dir),
            server.local_addr().port(),
        )
        .await?;
        println!("serving {} at http://{}", serve_cfg.dir, files.local_addr());
        _static_server = Some(files);
        runtime = runtime.with_notifier(server);

        rt_tx
            .send(RuntimeEvent::RunRequested {
                target: SERVE_TARGET.to_string(),
                expr: build_expr,
                reload: true,
            })
            .await
            .map_err(|e| anyhow!("queueing initial build: {e}"))?;
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(root = ?root, "watching for changes (Ctrl+C to stop)");
    let summary = runtime.run().await?;
    info!(
        runs = summary.completed_runs,
        failed = summary.failed_runs,
        "session ended"
    );
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "{} {:?} in {:.2?}",
        report.target, report.status, report.elapsed
    );
    for (task, status) in report.leaves.iter() {
        println!("  {status:<9} {task}");
    }
    for (task, message) in report.errors.iter() {
        println!("  error in {task}: {message}");
    }
    debug!(run_id = report.run_id, started = ?report.started_order, "run order");
}

/// `--list` output: tasks, pipelines and watch bindings.
fn print_list(cfg: &ConfigFile, registry: &TaskRegistry) {
    println!("tasks:");
    for task in registry.tasks() {
        print!("  {:<16} {}", task.name(), task.action().describe());
        if !task.predecessors().is_empty() {
            print!(" (after {})", task.predecessors().join(", "));
        }
        println!();
        if let Some(desc) = task.description() {
            println!("  {:<16} {desc}", "");
        }
    }

    let pipelines: Vec<_> = registry.pipelines().collect();
    if !pipelines.is_empty() {
        println!("pipelines:");
        for (name, expr) in pipelines {
            println!("  {name:<16} {expr}");
        }
    }

    if !cfg.watches().is_empty() {
        println!("watch:");
        for (name, w) in cfg.watches().iter() {
            println!(
                "  {name:<16} {:?} -> {}",
                w.patterns,
                TaskExpr::from(&w.run)
            );
        }
    }
}
