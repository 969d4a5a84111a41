// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{HashStorageMode, TriggerWhileRunningBehaviour};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// debounce_ms = 50
///
/// [data]
/// file = "data.toml"
///
/// [task.clean]
/// clean = "dist"
///
/// [task.css]
/// src = ["src/assets/css/*.css"]
/// dest = "dist/assets/css"
///
/// [pipeline.build]
/// seq = ["clean", { par = ["css", "templates"] }]
///
/// [watch.css]
/// patterns = ["src/assets/css/**/*"]
/// run = "css"
/// ```
///
/// Use `ConfigFile::try_from` to obtain a validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub data: DataSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Named task expressions from `[pipeline.<name>]`.
    #[serde(default)]
    pub pipeline: BTreeMap<String, ExprConfig>,

    /// Watch bindings from `[watch.<name>]`.
    #[serde(default)]
    pub watch: BTreeMap<String, WatchConfig>,

    #[serde(default)]
    pub serve: ServeSection,
}

/// Validated configuration.
///
/// Can only be obtained through `TryFrom<RawConfigFile>` (see
/// `config::validate`) or [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    data: DataSection,
    default: DefaultSection,
    task: BTreeMap<String, TaskConfig>,
    pipeline: BTreeMap<String, ExprConfig>,
    watch: BTreeMap<String, WatchConfig>,
    serve: ServeSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            data: raw.data,
            default: raw.default,
            task: raw.task,
            pipeline: raw.pipeline,
            watch: raw.watch,
            serve: raw.serve,
        }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.config
    }

    pub fn data_section(&self) -> &DataSection {
        &self.data
    }

    pub fn default_section(&self) -> &DefaultSection {
        &self.default
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn pipelines(&self) -> &BTreeMap<String, ExprConfig> {
        &self.pipeline
    }

    pub fn watches(&self) -> &BTreeMap<String, WatchConfig> {
        &self.watch
    }

    pub fn serve_section(&self) -> &ServeSection {
        &self.serve
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Quiet period that must elapse after the last change event for a
    /// binding before its run is triggered.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// `"queue"` or `"skip"`.
    #[serde(default)]
    pub triggered_while_running_behaviour: TriggerWhileRunningBehaviour,

    /// Where `use_hash` watch bindings keep their content hashes.
    #[serde(default)]
    pub hash_storage_mode: HashStorageMode,
}

fn default_debounce_ms() -> u64 {
    50
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            triggered_while_running_behaviour: TriggerWhileRunningBehaviour::default(),
            hash_storage_mode: HashStorageMode::default(),
        }
    }
}

/// `[data]` section: values handed to the template transform.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataSection {
    /// Path (relative to the config directory) of a TOML or JSON data file.
    #[serde(default)]
    pub file: Option<String>,
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Exclude patterns applied to transform sources and watch bindings that
    /// do not override them.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Default per-task timeout (e.g. `"2m"`). No timeout when unset.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[task.<name>]` section.
///
/// The action kind is decided by which field is present:
/// `cmd` (shell command), `clean` (directory removal), `src` (transform),
/// or none of them (a group that only runs its `after` tasks).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Predecessors: run (in parallel) before this task's own action.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Shell command; the task succeeds on exit code 0.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Directory to remove recursively.
    #[serde(default)]
    pub clean: Option<String>,

    /// Source glob patterns. A leading `!` excludes.
    #[serde(default)]
    pub src: Option<Vec<String>>,

    /// Destination directory for transform outputs.
    #[serde(default)]
    pub dest: Option<String>,

    /// Task-local exclude patterns; replaces `default.exclude` unless
    /// `append_default_exclude` is set.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    #[serde(default)]
    pub append_default_exclude: bool,

    /// Transformation applied per file; `copy` when omitted.
    #[serde(default)]
    pub transform: Option<TransformConfig>,

    #[serde(default)]
    pub rename: Option<RenameConfig>,

    /// Regex substitutions applied to text outputs, in order.
    #[serde(default)]
    pub replace: Vec<ReplaceConfig>,

    /// Bundle all outputs into a single file with this name.
    #[serde(default)]
    pub concat: Option<String>,

    /// Per-task timeout (e.g. `"30s"`), overriding `default.timeout`.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// The kind of action a task performs, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Command,
    Clean,
    Transform,
    Group,
}

impl TaskConfig {
    /// Action kinds present on this task. A valid task has at most one.
    pub fn declared_kinds(&self) -> Vec<TaskKind> {
        let mut kinds = Vec::new();
        if self.cmd.is_some() {
            kinds.push(TaskKind::Command);
        }
        if self.clean.is_some() {
            kinds.push(TaskKind::Clean);
        }
        if self.src.is_some() {
            kinds.push(TaskKind::Transform);
        }
        kinds
    }

    /// The task's action kind. Assumes a validated config.
    pub fn kind(&self) -> TaskKind {
        self.declared_kinds()
            .first()
            .copied()
            .unwrap_or(TaskKind::Group)
    }

    /// Effective excludes given `default.exclude`.
    pub fn effective_exclude(&self, defaults: &[String]) -> Vec<String> {
        match (&self.exclude, self.append_default_exclude) {
            (Some(list), true) => {
                let mut combined = list.clone();
                combined.extend(defaults.iter().cloned());
                combined
            }
            (Some(list), false) => list.clone(),
            (None, _) => defaults.to_vec(),
        }
    }

    /// Effective timeout string given `default.timeout`.
    pub fn effective_timeout<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.timeout.as_deref().or(default)
    }
}

/// Built-in per-file transformations.
///
/// ```toml
/// transform = "copy"
/// transform = { command = "sass --stdin --style=compressed" }
/// transform = { template = { partials = "src/partials" } }
/// transform = { template = { partials = "src/partials", ignore_partials = false } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformConfig {
    Copy,
    Command(String),
    Template(TemplateOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateOptions {
    /// Directory whose `*.hbs` files are registered as partials by file stem.
    #[serde(default)]
    pub partials: Option<String>,

    /// Fail on missing fields and missing partials instead of rendering
    /// them empty.
    #[serde(default)]
    pub strict: bool,

    /// Render `{{> name}}` of an unknown partial as nothing. Ignored in
    /// strict mode.
    #[serde(default = "default_ignore_partials")]
    pub ignore_partials: bool,
}

fn default_ignore_partials() -> bool {
    true
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            partials: None,
            strict: false,
            ignore_partials: default_ignore_partials(),
        }
    }
}

/// Output file renaming, e.g. `{ suffix = ".min" }` or `{ extname = ".html" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct RenameConfig {
    /// Appended to the file stem: `style.css` -> `style.min.css`.
    #[serde(default)]
    pub suffix: Option<String>,

    /// Replaces the extension, including the dot: `.hbs` -> `.html`.
    #[serde(default)]
    pub extname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplaceConfig {
    pub pattern: String,
    #[serde(default)]
    pub with: String,
}

/// A task expression as written in TOML.
///
/// - `"name"`: a task or pipeline.
/// - `{ seq = [...] }`: run members in order, stopping at the first failure.
/// - `{ par = [...] }`: run members concurrently; wait for all.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExprConfig {
    Name(String),
    Seq { seq: Vec<ExprConfig> },
    Par { par: Vec<ExprConfig> },
}

impl ExprConfig {
    /// All names referenced anywhere in this expression.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ExprConfig::Name(name) => out.push(name.as_str()),
            ExprConfig::Seq { seq: members } | ExprConfig::Par { par: members } => {
                for m in members {
                    m.collect_names(out);
                }
            }
        }
    }
}

/// `[watch.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns relative to the project root.
    pub patterns: Vec<String>,

    /// Expression to run when a matching path changes.
    pub run: ExprConfig,

    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Notify live-reload clients after each run (default true).
    #[serde(default = "default_true")]
    pub reload: bool,

    /// Only trigger when the aggregated content of watched files changed.
    #[serde(default)]
    pub use_hash: bool,
}

fn default_true() -> bool {
    true
}

/// `[serve]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeSection {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the live-reload WebSocket server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port of the static file server.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Directory served over HTTP, relative to the project root.
    #[serde(default = "default_serve_dir")]
    pub dir: String,

    /// Expression run before watching starts.
    #[serde(default = "default_serve_build")]
    pub build: ExprConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    35729
}

fn default_http_port() -> u16 {
    3000
}

fn default_serve_dir() -> String {
    "dist".to_string()
}

fn default_serve_build() -> ExprConfig {
    ExprConfig::Name("build".to_string())
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_port: default_http_port(),
            dir: default_serve_dir(),
            build: default_serve_build(),
        }
    }
}
