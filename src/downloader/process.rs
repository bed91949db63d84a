// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::downloader::error::DownloadError;
use crate::downloader::traits::{CommandSpec, ProcessOutput, ProcessRunner};

/// Appended to the output of a process killed on timeout
pub const TIMEOUT_SENTINEL: &str = "\nExecution timed out";

/// Appended to the output of a process killed on cancellation
pub const CANCELLED_SENTINEL: &str = "\nCancelled";

/// How long to keep draining pipes after a kill; grandchildren may hold them open
const DRAIN_GRACE: Duration = Duration::from_secs(2);

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs commands as real child processes
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a pipe line by line, echoing each line at debug level
fn collect_output<R>(reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut collected = String::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    debug!(target: "steamcmd", "{}", text.trim_end());
                    collected.push_str(&text);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read process output");
                    break;
                }
            }
        }

        collected
    })
}

async fn join_output(handle: Option<JoinHandle<String>>, grace: Option<Duration>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };

    let joined = match grace {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return String::new(),
        },
        None => handle.await,
    };

    joined.unwrap_or_default()
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<ProcessOutput, DownloadError> {
        debug!(
            program = %command.program.display(),
            args = ?command.args,
            cwd = %command.working_dir.display(),
            "Spawning process"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::ProcessSpawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().map(collect_output);
        let stderr = child.stderr.take().map(collect_output);

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = deadline => Outcome::TimedOut,
            _ = cancelled => Outcome::Cancelled,
        };

        let (exit_code, sentinel, grace) = match outcome {
            Outcome::Exited(status) => (status?.code(), None, None),
            Outcome::TimedOut => {
                warn!(program = %command.program.display(), "Process timed out, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out process");
                }
                (None, Some(TIMEOUT_SENTINEL), Some(DRAIN_GRACE))
            }
            Outcome::Cancelled => {
                warn!(program = %command.program.display(), "Process cancelled, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill cancelled process");
                }
                (None, Some(CANCELLED_SENTINEL), Some(DRAIN_GRACE))
            }
        };

        let mut output = join_output(stdout, grace).await;
        output.push_str(&join_output(stderr, grace).await);
        if let Some(sentinel) = sentinel {
            output.push_str(sentinel);
        }

        debug!(program = %command.program.display(), exit_code = ?exit_code, "Process finished");
        Ok(ProcessOutput { exit_code, output })
    }
}
