// src/transform/mod.rs

//! Per-file transformations and the invoker that applies them.
//!
//! A [`Transform`] is a black box from one input file to one output file.
//! The [`invoker::TransformInvoker`] resolves a task's `src` globs, runs the
//! transform over each input and writes the results beneath `dest`.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use crate::config::model::TransformConfig;
use crate::fs::FileSystem;

pub mod builtin;
pub mod invoker;
pub mod sources;
pub mod template;

pub use builtin::{CommandTransform, CopyTransform};
pub use invoker::{InvokeReport, TransformInvoker};
pub use sources::{glob_base, ResolvedSource, SourceSet};
pub use template::{TemplateData, TemplateRenderer, TemplateTransform};

/// An input file handed to a transform.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the glob base.
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

/// A transform result, written beneath the task's `dest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    /// Output that keeps the input's relative path.
    pub fn same_path(source: &SourceFile, contents: Vec<u8>) -> Self {
        Self {
            relative: source.relative.clone(),
            contents,
        }
    }
}

pub type TransformFuture<'a> = Pin<Box<dyn Future<Output = Result<OutputFile>> + Send + 'a>>;

pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Called once at the start of every invocation, off the async workers.
    /// Transforms with side inputs (template partials, data files) return a
    /// fresh instance built from their current contents; `None` keeps
    /// using `self` for every input.
    fn prepare(&self) -> Result<Option<Arc<dyn Transform>>> {
        Ok(None)
    }

    fn apply<'a>(&'a self, file: SourceFile) -> TransformFuture<'a>;
}

/// Instantiate the transform named in a task's config; `copy` when omitted.
pub fn transform_from_config(
    cfg: Option<&TransformConfig>,
    root: &Path,
    data: &TemplateData,
    fs: Arc<dyn FileSystem>,
) -> Arc<dyn Transform> {
    match cfg {
        None | Some(TransformConfig::Copy) => Arc::new(CopyTransform),
        Some(TransformConfig::Command(cmd)) => Arc::new(CommandTransform::new(cmd, root)),
        Some(TransformConfig::Template(options)) => Arc::new(
            TemplateTransform::new(data.clone(), fs)
                .with_partials(options.partials.as_ref().map(|p| root.join(p)))
                .strict(options.strict)
                .ignore_partials(options.ignore_partials),
        ),
    }
}
