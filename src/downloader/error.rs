// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected page format: {0}")]
    PageFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to launch {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SteamCMD exited with {exit_code:?}: {output}")]
    ToolFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Downloaded content missing or empty after {passes} checks: {}", .path.display())]
    Validation { path: PathBuf, passes: u32 },

    #[error("Download attempt panicked: {0}")]
    AttemptPanicked(String),

    #[error("Workshop item {item_id} failed after {attempts} attempts")]
    RetryExhausted { item_id: String, attempts: u32 },

    #[error("Workshop item {item_id} stopped because the run was aborted")]
    Aborted { item_id: String },

    #[error("SteamCMD setup failed: {0}")]
    Bootstrap(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt at the same item may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::ProcessSpawn { .. }
                | DownloadError::ToolFailed { .. }
                | DownloadError::Validation { .. }
                | DownloadError::AttemptPanicked(_)
                | DownloadError::Io(_)
        )
    }
}
