// src/reload/mod.rs

//! Live-reload notification and the `serve` file server.
//!
//! A [`ReloadNotifier`] is told which paths changed after a Run finishes.
//! Notifying is fire-and-forget: implementations must not block the caller
//! and must swallow (log) their own failures.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

pub mod http;
pub mod server;

pub use http::StaticServer;
pub use server::WsReloadServer;

pub trait ReloadNotifier: Send + Sync + fmt::Debug {
    /// `changed` is a hint; empty means "reload everything".
    fn notify(&self, changed: &[PathBuf]);
}

/// Only logs. Used when no reload server is running.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl ReloadNotifier for LogNotifier {
    fn notify(&self, changed: &[PathBuf]) {
        info!(paths = changed.len(), "reload");
    }
}
