use std::collections::BTreeMap;

use assetpipe::config::{
    ConfigFile, ConfigSection, DataSection, DefaultSection, ExprConfig, RawConfigFile,
    RenameConfig, ReplaceConfig, ServeSection, TaskConfig, TransformConfig, WatchConfig,
};
use assetpipe::errors::Result;

/// `"name"` expression.
pub fn name(n: &str) -> ExprConfig {
    ExprConfig::Name(n.to_string())
}

/// `{ seq = [...] }` of plain names.
pub fn seq(names: &[&str]) -> ExprConfig {
    ExprConfig::Seq {
        seq: names.iter().map(|n| name(n)).collect(),
    }
}

/// `{ par = [...] }` of plain names.
pub fn par(names: &[&str]) -> ExprConfig {
    ExprConfig::Par {
        par: names.iter().map(|n| name(n)).collect(),
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                data: DataSection::default(),
                default: DefaultSection::default(),
                task: BTreeMap::new(),
                pipeline: BTreeMap::new(),
                watch: BTreeMap::new(),
                serve: ServeSection::default(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_pipeline(mut self, name: &str, expr: ExprConfig) -> Self {
        self.config.pipeline.insert(name.to_string(), expr);
        self
    }

    pub fn with_watch(mut self, name: &str, patterns: &[&str], run: ExprConfig) -> Self {
        self.config.watch.insert(
            name.to_string(),
            WatchConfig {
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                run,
                exclude: None,
                reload: true,
                use_hash: false,
            },
        );
        self
    }

    pub fn with_default_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.default.timeout = Some(timeout.to_string());
        self
    }

    pub fn with_data_file(mut self, file: &str) -> Self {
        self.config.data.file = Some(file.to_string());
        self
    }

    /// Validate, returning the error instead of panicking.
    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A task running a shell command.
    pub fn cmd(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..Default::default()
            },
        }
    }

    /// A task removing `dir`.
    pub fn clean(dir: &str) -> Self {
        Self {
            task: TaskConfig {
                clean: Some(dir.to_string()),
                ..Default::default()
            },
        }
    }

    /// A transform task from `src` patterns into `dest` (copy by default).
    pub fn transform(src: &[&str], dest: &str) -> Self {
        Self {
            task: TaskConfig {
                src: Some(src.iter().map(|s| s.to_string()).collect()),
                dest: Some(dest.to_string()),
                ..Default::default()
            },
        }
    }

    /// A task with no action of its own.
    pub fn group() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn with(mut self, transform: TransformConfig) -> Self {
        self.task.transform = Some(transform);
        self
    }

    pub fn command_transform(self, cmd: &str) -> Self {
        self.with(TransformConfig::Command(cmd.to_string()))
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task
            .exclude
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.task
            .rename
            .get_or_insert_with(RenameConfig::default)
            .suffix = Some(suffix.to_string());
        self
    }

    pub fn extname(mut self, ext: &str) -> Self {
        self.task
            .rename
            .get_or_insert_with(RenameConfig::default)
            .extname = Some(ext.to_string());
        self
    }

    pub fn replace(mut self, pattern: &str, with: &str) -> Self {
        self.task.replace.push(ReplaceConfig {
            pattern: pattern.to_string(),
            with: with.to_string(),
        });
        self
    }

    pub fn concat(mut self, file: &str) -> Self {
        self.task.concat = Some(file.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
