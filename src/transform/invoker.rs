// src/transform/invoker.rs

//! Runs one transform task: resolve sources, transform, post-process, write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::model::{RenameConfig, ReplaceConfig, TaskConfig};
use crate::errors::{PipelineError, Result};
use crate::fs::{FileSystem, blocking};
use crate::transform::{
    transform_from_config, OutputFile, SourceFile, SourceSet, TemplateData, Transform,
};
use crate::types::TaskName;

/// Summary of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeReport {
    pub inputs: usize,
    /// Files written, relative to the project root.
    pub written: Vec<PathBuf>,
}

/// Applies a [`Transform`] to every file matched by a [`SourceSet`] and
/// writes the outputs beneath `dest`.
///
/// Every invocation first calls [`Transform::prepare`], so transforms with
/// side inputs see their current state. Inputs are processed one at a time
/// in sorted path order; file IO runs on the blocking pool. When some inputs
/// fail the others are still transformed and written, and the task fails
/// with a [`PipelineError::Transform`] naming every failing input. Outputs
/// already written are left in place.
#[derive(Debug)]
pub struct TransformInvoker {
    task: TaskName,
    root: PathBuf,
    sources: Arc<SourceSet>,
    dest: PathBuf,
    transform: Arc<dyn Transform>,
    rename: Option<RenameConfig>,
    replace: Vec<(Regex, String)>,
    concat: Option<String>,
    fs: Arc<dyn FileSystem>,
}

impl TransformInvoker {
    pub fn new(
        task: impl Into<TaskName>,
        root: &Path,
        sources: SourceSet,
        dest: impl Into<PathBuf>,
        transform: Arc<dyn Transform>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            task: task.into(),
            root: root.to_path_buf(),
            sources: Arc::new(sources),
            dest: dest.into(),
            transform,
            rename: None,
            replace: Vec::new(),
            concat: None,
            fs,
        }
    }

    pub fn with_rename(mut self, rename: Option<RenameConfig>) -> Self {
        self.rename = rename;
        self
    }

    pub fn with_replace(mut self, rules: &[ReplaceConfig]) -> Result<Self> {
        for rule in rules {
            let re = Regex::new(&rule.pattern).map_err(|e| {
                PipelineError::ConfigError(format!(
                    "task '{}' has invalid replace pattern '{}': {}",
                    self.task, rule.pattern, e
                ))
            })?;
            self.replace.push((re, rule.with.clone()));
        }
        Ok(self)
    }

    pub fn with_concat(mut self, concat: Option<String>) -> Self {
        self.concat = concat;
        self
    }

    /// Build the invoker for a `src`/`dest` task.
    pub fn from_task_config(
        name: &str,
        cfg: &TaskConfig,
        default_exclude: &[String],
        root: &Path,
        data: &TemplateData,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let (Some(src), Some(dest)) = (&cfg.src, &cfg.dest) else {
            return Err(PipelineError::ConfigError(format!(
                "task '{name}' needs both `src` and `dest`"
            )));
        };

        let sources = SourceSet::new(src, &cfg.effective_exclude(default_exclude))?;
        let transform = transform_from_config(cfg.transform.as_ref(), root, data, fs.clone());

        TransformInvoker::new(name, root, sources, dest, transform, fs)
            .with_rename(cfg.rename.clone())
            .with_concat(cfg.concat.clone())
            .with_replace(&cfg.replace)
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// e.g. `template -> dist` or `copy -> dist/fonts (concat scripts.js)`.
    pub fn summary(&self) -> String {
        let mut s = format!("{} -> {}", self.transform.name(), self.dest.display());
        if let Some(name) = &self.concat {
            s.push_str(&format!(" (concat {name})"));
        }
        s
    }

    /// Resolve, transform and write. See the type docs for failure handling.
    pub async fn invoke(&self) -> Result<InvokeReport> {
        let inputs = {
            let sources = Arc::clone(&self.sources);
            let fs = Arc::clone(&self.fs);
            let root = self.root.clone();
            blocking(move || sources.resolve(fs.as_ref(), &root)).await
        }
        .map_err(|e| PipelineError::transform(&self.task, &self.root, format!("{e:#}")))?;

        let transform = self
            .prepare()
            .await
            .map_err(|e| PipelineError::transform(&self.task, &self.root, format!("{e:#}")))?;

        debug!(
            task = %self.task,
            transform = transform.name(),
            inputs = inputs.len(),
            "resolved transform inputs"
        );

        let mut outputs = Vec::with_capacity(inputs.len());
        let mut failures: Vec<(PathBuf, String)> = Vec::new();
        let mut written = Vec::new();

        for input in inputs.iter() {
            match self.transform_one(transform.as_ref(), &input.path, &input.relative).await {
                Ok(output) if self.concat.is_some() => outputs.push(output),
                Ok(output) => match self.write(output).await {
                    Ok(path) => written.push(path),
                    Err(e) => failures.push((input.path.clone(), format!("{e:#}"))),
                },
                Err(e) => failures.push((input.path.clone(), format!("{e:#}"))),
            }
        }

        if !failures.is_empty() {
            for (path, message) in failures.iter() {
                warn!(task = %self.task, path = %path.display(), error = %message, "input failed");
            }
            let message = match failures.as_slice() {
                [(_, only)] => only.clone(),
                [(_, first), ..] => format!("{} inputs failed; first error: {first}", failures.len()),
                [] => String::new(),
            };
            return Err(PipelineError::Transform {
                task: self.task.clone(),
                paths: failures.into_iter().map(|(p, _)| p).collect(),
                message,
            });
        }

        if let Some(name) = &self.concat {
            let bundle = concat_outputs(name, outputs);
            let relative = bundle.relative.clone();
            let path = self
                .write(bundle)
                .await
                .map_err(|e| PipelineError::transform(&self.task, &relative, format!("{e:#}")))?;
            written.push(path);
        }

        info!(
            task = %self.task,
            inputs = inputs.len(),
            outputs = written.len(),
            "transform finished"
        );

        Ok(InvokeReport {
            inputs: inputs.len(),
            written,
        })
    }

    /// The transform instance for one invocation.
    async fn prepare(&self) -> anyhow::Result<Arc<dyn Transform>> {
        let transform = Arc::clone(&self.transform);
        let prepared = blocking(move || transform.prepare()).await?;
        Ok(prepared.unwrap_or_else(|| Arc::clone(&self.transform)))
    }

    async fn transform_one(
        &self,
        transform: &dyn Transform,
        path: &Path,
        relative: &Path,
    ) -> anyhow::Result<OutputFile> {
        let contents = {
            let fs = Arc::clone(&self.fs);
            let path = path.to_path_buf();
            blocking(move || fs.read(&path)).await?
        };
        let source = SourceFile {
            path: path.to_path_buf(),
            relative: relative.to_path_buf(),
            contents,
        };

        let mut output = transform.apply(source).await?;

        if let Some(rename) = &self.rename {
            output.relative = rename_path(&output.relative, rename);
        }
        if !self.replace.is_empty() {
            output.contents = apply_replacements(output.contents, &self.replace);
        }
        Ok(output)
    }

    async fn write(&self, output: OutputFile) -> anyhow::Result<PathBuf> {
        let rel_target = self.dest.join(&output.relative);
        let fs = Arc::clone(&self.fs);
        let target = self.root.join(&rel_target);
        blocking(move || fs.write(&target, &output.contents)).await?;
        Ok(rel_target)
    }
}

/// Apply `suffix`/`extname` to a relative output path.
///
/// `css/site.css` + `{ suffix = ".min" }` -> `css/site.min.css`;
/// `index.hbs` + `{ extname = ".html" }` -> `index.html`.
pub fn rename_path(relative: &Path, rename: &RenameConfig) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = match &rename.extname {
        Some(ext) => ext.clone(),
        None => relative
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
    };
    let suffix = rename.suffix.as_deref().unwrap_or("");
    relative.with_file_name(format!("{stem}{suffix}{ext}"))
}

/// Regex substitutions on text output. Non UTF-8 output passes through.
fn apply_replacements(contents: Vec<u8>, rules: &[(Regex, String)]) -> Vec<u8> {
    match String::from_utf8(contents) {
        Ok(mut text) => {
            for (re, with) in rules {
                text = re.replace_all(&text, with.as_str()).into_owned();
            }
            text.into_bytes()
        }
        Err(e) => e.into_bytes(),
    }
}

fn concat_outputs(name: &str, outputs: Vec<OutputFile>) -> OutputFile {
    let mut contents = Vec::new();
    for (i, out) in outputs.into_iter().enumerate() {
        if i > 0 && !contents.ends_with(b"\n") {
            contents.push(b'\n');
        }
        contents.extend_from_slice(&out.contents);
    }
    OutputFile {
        relative: PathBuf::from(name),
        contents,
    }
}
