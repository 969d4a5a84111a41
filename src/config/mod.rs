// src/config/mod.rs

//! Configuration loading and validation for assetpipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file and the template data file from disk (`loader.rs`).
//! - Validate names, references and the task graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    config_root_dir, load_and_validate, load_from_path, load_template_data, parse_template_data,
};
pub use model::{
    ConfigFile, ConfigSection, DataSection, DefaultSection, ExprConfig, RawConfigFile,
    RenameConfig, ReplaceConfig, ServeSection, TaskConfig, TaskKind, TemplateOptions,
    TransformConfig, WatchConfig,
};
