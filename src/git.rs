//! `git` subprocess runner.
//!
//! Every invocation runs non-interactively (`GIT_TERMINAL_PROMPT=0`, stdin
//! closed) and is spawned with `kill_on_drop`, so dropping the future returned by
//! a [`GitRunner`] method terminates the child. Output is streamed line by line
//! into debug logs with credentials redacted.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::GitRunner;
use crate::error::{FleetError, Result};
use crate::providers::http::redact_url;

#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

struct Captured {
    code: i32,
    stdout: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable, e.g. an absolute path to `git`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], keep_stdout: bool) -> Result<Captured> {
        let printable = args
            .iter()
            .map(|a| redact_url(a))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %format!("{} {printable}", self.program), "Spawning git");

        let mut child = Command::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(error = ?e, program = %self.program, "Failed to launch git process");
                FleetError::Io(e)
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, _, status) = tokio::join!(
            drain(stdout, "stdout", keep_stdout),
            drain(stderr, "stderr", false),
            child.wait()
        );
        let status = status?;

        Ok(Captured {
            // A missing code means the child died from a signal.
            code: status.code().unwrap_or(-1),
            stdout,
        })
    }
}

/// Forward each output line to the debug log; optionally keep stdout.
async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, name: &'static str, keep: bool) -> String {
    let mut kept = String::new();
    let Some(stream) = stream else {
        return kept;
    };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream = name, "git: {}", redact_url(&line));
        if keep {
            kept.push_str(&line);
            kept.push('\n');
        }
    }
    kept
}

#[async_trait]
impl GitRunner for GitCli {
    async fn clone_repo(&self, url: &str, target_dir: &Path, dir_name: &str) -> Result<i32> {
        let destination = target_dir.join(dir_name);
        let destination = destination.to_string_lossy();
        let captured = self.run(&["clone", url, &destination], false).await?;
        if captured.code == 0 {
            info!(url = %redact_url(url), path = %destination, "[CLONE] Cloned repository");
        } else {
            error!(url = %redact_url(url), path = %destination, code = captured.code, "[CLONE] git clone exited with non-zero code");
        }
        Ok(captured.code)
    }

    async fn pull(&self, repo_dir: &Path) -> Result<i32> {
        let dir = repo_dir.to_string_lossy();
        let captured = self.run(&["-C", &dir, "pull"], false).await?;
        if captured.code == 0 {
            info!(path = %dir, "[CLONE] Pulled repository");
        } else {
            error!(path = %dir, code = captured.code, "[CLONE] git pull exited with non-zero code");
        }
        Ok(captured.code)
    }

    async fn status(&self, repo_dir: &Path) -> Result<String> {
        let dir = repo_dir.to_string_lossy();
        let captured = self
            .run(&["-C", &dir, "status", "--porcelain=v1", "--branch"], true)
            .await?;
        if captured.code != 0 {
            return Err(FleetError::repo_op_with(
                dir.into_owned(),
                "status failed",
                format!("exit code {}", captured.code),
            ));
        }
        Ok(captured.stdout)
    }
}
