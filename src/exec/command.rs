// src/exec/command.rs

//! Shell command invocation behind the [`CommandRunner`] seam.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How many trailing stderr lines are kept as a failure message.
pub const STDERR_TAIL_LINES: usize = 20;

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `n` lines of stderr, joined with newlines.
    pub fn stderr_tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Runs the command of a Command task.
///
/// Implementations must be cancel-safe: dropping the returned future stops
/// the command.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        task: &'a str,
        cmd: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;
}

/// Production runner: `sh -c <cmd>` (or `cmd /C` on Windows) via
/// `tokio::process`, with stdout/stderr captured and logged at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run<'a>(
        &'a self,
        task: &'a str,
        cmd: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>> {
        Box::pin(run_shell(task, cmd))
    }
}

async fn run_shell(task: &str, cmd_line: &str) -> Result<CommandOutput> {
    info!(task = %task, cmd = %cmd_line, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task))?;

    // Always consume both pipes so buffers don't fill.
    let stdout = child
        .stdout
        .take()
        .map(|out| spawn_line_collector(task.to_string(), "stdout", out, None));
    let stderr = child
        .stderr
        .take()
        .map(|err| spawn_line_collector(task.to_string(), "stderr", err, Some(STDERR_TAIL_LINES)));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", task))?;

    let output = CommandOutput {
        exit_code: status.code(),
        stdout: join_collector(stdout).await,
        stderr: join_collector(stderr).await,
    };

    info!(
        task = %task,
        exit_code = ?output.exit_code,
        success = status.success(),
        "task process exited"
    );

    Ok(output)
}

/// Read `reader` line by line, logging each line. With `keep_last`, only the
/// trailing lines are retained.
fn spawn_line_collector<R>(
    task: String,
    stream: &'static str,
    reader: R,
    keep_last: Option<usize>,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut kept: VecDeque<String> = VecDeque::new();

        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task, stream, "{}", line);
            kept.push_back(line);
            if let Some(max) = keep_last {
                while kept.len() > max {
                    kept.pop_front();
                }
            }
        }

        Vec::from(kept).join("\n")
    })
}

async fn join_collector(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
    }
}
