// SPDX-License-Identifier: GPL-3.0-only
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::downloader::{
    error::DownloadError,
    steamcmd::{SteamCmd, excerpt},
    traits::ProcessRunner,
};
use crate::utils::validate_directory_non_empty;

/// Retry, validation and cancellation knobs for a single item download
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Attempts per item, at least 1
    pub max_retries: u32,
    /// Attempt N failing is followed by an `N * base_delay` pause
    pub base_delay: Duration,
    /// Passes over the content dir after SteamCMD reports success
    pub validation_attempts: u32,
    pub validation_delay: Duration,
    /// `None` waits for SteamCMD indefinitely
    pub timeout: Option<Duration>,
    pub success_marker: Option<String>,
    /// Hand the abort token to SteamCMD so a sibling failure kills it
    pub kill_in_flight_on_abort: bool,
}

impl From<&Config> for DownloadSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            validation_attempts: config.validation_attempts,
            validation_delay: Duration::from_millis(config.validation_delay_ms),
            timeout: config.download_timeout_secs.map(Duration::from_secs),
            success_marker: config.success_marker.clone(),
            kill_in_flight_on_abort: config.kill_in_flight_on_abort,
        }
    }
}

/// Downloads one workshop item at a time through SteamCMD.
///
/// Shared by every task of a run. All deletions and existence checks below
/// the content root go through `fs_lock`.
pub struct WorkshopDownloader {
    steamcmd: Arc<SteamCmd>,
    runner: Arc<dyn ProcessRunner>,
    settings: DownloadSettings,
    fs_lock: Mutex<()>,
}

impl WorkshopDownloader {
    pub fn new(steamcmd: Arc<SteamCmd>, runner: Arc<dyn ProcessRunner>, settings: DownloadSettings) -> Self {
        Self {
            steamcmd,
            runner,
            settings,
            fs_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn steamcmd(&self) -> &SteamCmd {
        &self.steamcmd
    }

    /// Download `item_id`, retrying with linear backoff.
    ///
    /// Returns the number of attempts used. When every attempt fails, or one
    /// fails in a way another attempt cannot fix, `abort` is cancelled and
    /// `RetryExhausted` returned with the attempts actually made. No retry is
    /// started once `abort` has been cancelled by another item, and a pending
    /// backoff ends as soon as that happens.
    pub async fn download_one(
        &self,
        app_id: &str,
        item_id: &str,
        abort: &CancellationToken,
    ) -> Result<u32, DownloadError> {
        let max = self.settings.max_retries.max(1);
        let process_cancel = self.settings.kill_in_flight_on_abort.then(|| abort.clone());
        let aborted = || DownloadError::Aborted { item_id: item_id.to_string() };

        let mut attempts = 0;
        for attempt in 1..=max {
            if attempt > 1 && abort.is_cancelled() {
                warn!(item_id, attempt, "Run aborted, not retrying");
                return Err(aborted());
            }

            info!(item_id, attempt, max, "Downloading workshop item");
            attempts = attempt;

            let result = AssertUnwindSafe(self.attempt(app_id, item_id, process_cancel.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(DownloadError::AttemptPanicked(panic_message(panic))));

            match result {
                Ok(()) => {
                    info!(item_id, attempt, "Workshop item downloaded");
                    return Ok(attempt);
                }
                Err(e) if !e.is_retryable() => {
                    error!(item_id, attempt, error = %e, "Download attempt failed permanently");
                    break;
                }
                Err(e) => {
                    warn!(item_id, attempt, max, error = %e, "Download attempt failed");
                }
            }

            if process_cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(aborted());
            }

            if attempt < max {
                let delay = self.settings.base_delay * attempt;
                info!(item_id, delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = abort.cancelled() => {
                        warn!(item_id, attempt, "Run aborted during backoff");
                        return Err(aborted());
                    }
                }
            }
        }

        error!(item_id, attempts, "Workshop item failed, aborting run");
        abort.cancel();
        Err(DownloadError::RetryExhausted { item_id: item_id.to_string(), attempts })
    }

    /// One clean-slate attempt: wipe the content dir, run SteamCMD, validate
    async fn attempt(
        &self,
        app_id: &str,
        item_id: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DownloadError> {
        let target = self.steamcmd.content_dir(app_id, item_id);

        {
            let _guard = self.fs_lock.lock().await;
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&target).await?;
            }
        }

        let command = self.steamcmd.download_command(app_id, item_id);
        let output = self.runner.run(&command, self.settings.timeout, cancel).await?;

        if !output.success() {
            return Err(DownloadError::ToolFailed {
                exit_code: output.exit_code,
                output: excerpt(&output.output),
            });
        }

        if let Some(marker) = &self.settings.success_marker {
            if !output.output.contains(marker.as_str()) {
                return Err(DownloadError::ToolFailed {
                    exit_code: output.exit_code,
                    output: format!("success marker missing: {}", excerpt(&output.output)),
                });
            }
        }

        let passes = self.settings.validation_attempts.max(1);
        for pass in 1..=passes {
            let valid = {
                let _guard = self.fs_lock.lock().await;
                validate_directory_non_empty(&target).await
            };
            if valid {
                return Ok(());
            }

            warn!(item_id, pass, path = %target.display(), "Downloaded content not found yet");
            if pass < passes {
                tokio::time::sleep(self.settings.validation_delay).await;
            }
        }

        Err(DownloadError::Validation { path: target, passes })
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
