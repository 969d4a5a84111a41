// src/exec/command.rs

//! Shell command execution shared by `cmd` tasks and the `command` transform.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last few lines of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(5);
        lines[start..].join("\n")
    }
}

/// Build a shell command appropriate for the platform.
fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Run `cmd` through the shell in `cwd`, optionally feeding `stdin`, and
/// capture its output.
///
/// The child is killed if the returned future is dropped (e.g. on timeout).
pub async fn run_shell(cmd: &str, cwd: &Path, stdin: Option<&[u8]>) -> Result<CommandOutput> {
    let mut command = shell(cmd);
    command
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning shell command `{cmd}`"))?;

    let mut child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout of `{cmd}` was not captured"))?;
    let mut child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr of `{cmd}` was not captured"))?;

    // Feed stdin concurrently with draining stdout/stderr so large inputs
    // cannot deadlock on full pipe buffers.
    let input = stdin.map(|b| b.to_vec());
    let child_stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(bytes)) = (child_stdin, input) {
            pipe.write_all(&bytes).await?;
            pipe.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let (fed, out, err) = tokio::join!(
        feed,
        child_stdout.read_to_end(&mut stdout),
        child_stderr.read_to_end(&mut stderr)
    );
    // A command that exits without reading stdin yields a broken pipe here;
    // its exit status is what decides success.
    if let Err(e) = fed {
        debug!(cmd = %cmd, error = %e, "writing stdin failed");
    }
    out.with_context(|| format!("reading stdout of `{cmd}`"))?;
    err.with_context(|| format!("reading stderr of `{cmd}`"))?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for shell command `{cmd}`"))?;

    let exit_code = status.code().unwrap_or(-1);
    debug!(cmd = %cmd, exit_code, "shell command exited");

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
    })
}
