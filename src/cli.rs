// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Reserved target: run watch bindings only (no initial build).
pub const WATCH_TARGET: &str = "watch";

/// Reserved target: build, then watch and push live-reload signals.
pub const SERVE_TARGET: &str = "serve";

/// Command-line arguments for `assetpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetpipe",
    version,
    about = "Build front-end assets from declarative task pipelines.",
    long_about = None
)]
pub struct CliArgs {
    /// Task or pipeline to run, or `watch` / `serve`.
    #[arg(value_name = "TARGET", default_value = "build")]
    pub target: String,

    /// Path to the config file (TOML).
    ///
    /// Default: `Assetpipe.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Assetpipe.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETPIPE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the expanded target, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// List registered tasks, pipelines and watch bindings, then exit.
    #[arg(long)]
    pub list: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_build() {
        let args = CliArgs::try_parse_from(["assetpipe"]).unwrap();
        assert_eq!(args.target, "build");
        assert_eq!(args.config, "Assetpipe.toml");
        assert!(!args.dry_run);
    }

    #[test]
    fn accepts_target_and_flags() {
        let args = CliArgs::try_parse_from([
            "assetpipe",
            "serve",
            "--config",
            "site/Assetpipe.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.target, SERVE_TARGET);
        assert_eq!(args.config, "site/Assetpipe.toml");
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
