// src/logging.rs

//! Logging setup for `assetpipe` using `tracing` + `tracing-subscriber`.
//!
//! The filter is picked in this order:
//! 1. `--log-level` CLI flag, applied to everything
//! 2. `ASSETPIPE_LOG`, either a bare level ("debug") or full `EnvFilter`
//!    directives ("assetpipe=debug,notify=trace")
//! 3. `info`
//!
//! Chatty dependencies are held at `warn` unless a directive names them.
//! Logs go to STDERR; stdout carries run summaries and `--list` output.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV_VAR: &str = "ASSETPIPE_LOG";

const DEFAULT_LEVEL: &str = "info";

const QUIET_DEPS: &[&str] = &["tungstenite", "tokio_tungstenite", "handlebars", "notify", "globset"];

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let directives = filter_directives(cli_level, env.as_deref());

    let (filter, rejected) = match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(e) => (
            EnvFilter::new(filter_directives(None, None)),
            Some(format!("{e}")),
        ),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(cli_level.is_some_and(|l| matches!(l, LogLevel::Debug | LogLevel::Trace)))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    if let Some(reason) = rejected {
        tracing::warn!(value = ?env, %reason, "ignoring invalid {LOG_ENV_VAR}");
    }
    Ok(())
}

/// Directive string for the given CLI level and `ASSETPIPE_LOG` value.
fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    let base = match (cli_level, env.map(str::trim).filter(|s| !s.is_empty())) {
        (Some(lvl), _) => level_name(lvl).to_string(),
        (None, Some(value)) => match normalize_level(value) {
            Some(level) => level.to_string(),
            // Full directives are passed through untouched.
            None => return value.to_string(),
        },
        (None, None) => DEFAULT_LEVEL.to_string(),
    };

    let mut out = base;
    for dep in QUIET_DEPS {
        out.push_str(&format!(",{dep}=warn"));
    }
    out
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn normalize_level(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_and_quiets_dependencies() {
        let d = filter_directives(Some(LogLevel::Debug), Some("trace"));
        assert!(d.starts_with("debug,"));
        assert!(d.contains("tungstenite=warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }

    #[test]
    fn env_accepts_loose_levels_and_raw_directives() {
        assert!(filter_directives(None, Some(" Warning ")).starts_with("warn,"));
        assert_eq!(
            filter_directives(None, Some("assetpipe=debug,notify=trace")),
            "assetpipe=debug,notify=trace"
        );
        assert!(filter_directives(None, Some("")).starts_with("info,"));
        assert!(filter_directives(None, None).starts_with("info,"));
    }
}
