// src/transform/builtin.rs

use std::path::{Path, PathBuf};

use anyhow::bail;

use crate::exec::command::run_shell;
use crate::transform::{OutputFile, SourceFile, Transform, TransformFuture};

/// Identity transform.
#[derive(Debug, Clone, Default)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply<'a>(&'a self, file: SourceFile) -> TransformFuture<'a> {
        Box::pin(async move { Ok(OutputFile::same_path(&file, file.contents.clone())) })
    }
}

/// Pipes each file through a shell command: contents on stdin, output read
/// from stdout. A non-zero exit fails that input.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    cmd: String,
    cwd: PathBuf,
}

impl CommandTransform {
    pub fn new(cmd: impl Into<String>, cwd: &Path) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.to_path_buf(),
        }
    }
}

impl Transform for CommandTransform {
    fn name(&self) -> &str {
        &self.cmd
    }

    fn apply<'a>(&'a self, file: SourceFile) -> TransformFuture<'a> {
        Box::pin(async move {
            let out = run_shell(&self.cmd, &self.cwd, Some(&file.contents)).await?;
            if !out.success() {
                bail!(
                    "`{}` exited with code {}: {}",
                    self.cmd,
                    out.exit_code,
                    out.stderr_tail()
                );
            }
            Ok(OutputFile::same_path(&file, out.stdout))
        })
    }
}
