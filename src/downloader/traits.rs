// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::downloader::error::DownloadError;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a web page and return its body as text
    async fn fetch_page(&self, url: &str) -> Result<String, DownloadError>;
}

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed (timeout or cancellation)
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// A `timeout` of `None` waits indefinitely. When `cancel` fires the process
    /// is killed. Only a failure to launch is reported as an error.
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<ProcessOutput, DownloadError>;
}
