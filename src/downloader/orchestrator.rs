// SPDX-License-Identifier: GPL-3.0-only
use futures_util::FutureExt;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::downloader::{error::DownloadError, workshop::WorkshopDownloader};
use crate::utils::is_valid_steam_id;

/// Outcome of draining one queue of workshop items
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub succeeded_ids: BTreeSet<String>,
    /// Items that ended in an error, in completion order
    pub failed_ids: Vec<String>,
    /// Items never dispatched because the run aborted
    pub not_started: Vec<String>,
    pub failed: bool,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        if self.failed { 1 } else { 0 }
    }
}

/// Live count of running downloads; decremented on drop so panics are covered
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { counter: Arc::clone(counter) }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drains a queue of item ids through `WorkshopDownloader` with at most
/// `concurrency_cap` downloads in flight.
///
/// The first item to exhaust its retries cancels the run's abort token:
/// nothing new is dispatched afterwards, and downloads already running are
/// left to finish their current attempt (or killed, when the downloader is
/// configured with `kill_in_flight_on_abort`). Every spawned task is joined
/// before `run` returns.
pub struct Orchestrator {
    downloader: Arc<WorkshopDownloader>,
    concurrency_cap: usize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn new(downloader: Arc<WorkshopDownloader>, concurrency_cap: usize) -> Result<Self, DownloadError> {
        if concurrency_cap == 0 {
            return Err(DownloadError::InvalidInput("concurrency cap must be at least 1".to_string()));
        }
        if downloader.settings().max_retries == 0 {
            return Err(DownloadError::InvalidInput("max retries must be at least 1".to_string()));
        }

        Ok(Self {
            downloader,
            concurrency_cap,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Downloads currently running
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous downloads seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub async fn run(&self, app_id: &str, item_ids: Vec<String>) -> Result<RunResult, DownloadError> {
        if !is_valid_steam_id(app_id) {
            return Err(DownloadError::InvalidInput(format!("invalid app id '{app_id}'")));
        }
        if let Some(bad) = item_ids.iter().find(|id| !is_valid_steam_id(id)) {
            return Err(DownloadError::InvalidInput(format!("invalid workshop item id '{bad}'")));
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> = item_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        info!(
            app_id,
            items = queue.len(),
            concurrency = self.concurrency_cap,
            max_retries = self.downloader.settings().max_retries,
            "Starting workshop downloads"
        );

        let abort = CancellationToken::new();
        let slots = Arc::new(Semaphore::new(self.concurrency_cap));
        let mut tasks = JoinSet::new();
        let total = queue.len();
        let mut dispatched = 0usize;

        while !queue.is_empty() {
            let permit = tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // A slot may free up in the same instant another item aborts the run
            if abort.is_cancelled() {
                break;
            }

            let Some(item_id) = queue.pop_front() else {
                break;
            };
            dispatched += 1;
            info!(item_id = %item_id, position = dispatched, total, "Dispatching download");

            let guard = InFlightGuard::enter(&self.in_flight, &self.peak_in_flight);
            let downloader = Arc::clone(&self.downloader);
            let abort = abort.clone();
            let app_id = app_id.to_string();

            tasks.spawn(async move {
                let _permit = permit;
                let _guard = guard;

                let result = AssertUnwindSafe(downloader.download_one(&app_id, &item_id, &abort))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        abort.cancel();
                        Err(DownloadError::AttemptPanicked(format!("download task for {item_id} panicked")))
                    });

                (item_id, result)
            });
        }

        let mut result = RunResult {
            not_started: queue.into_iter().collect(),
            ..RunResult::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((item_id, Ok(attempts))) => {
                    info!(item_id = %item_id, attempts, "Download finished");
                    result.succeeded_ids.insert(item_id);
                }
                Ok((item_id, Err(e))) => {
                    error!(item_id = %item_id, error = %e, "Download failed");
                    result.failed_ids.push(item_id);
                }
                Err(e) => {
                    error!(error = %e, "Download task did not complete");
                    result.failed = true;
                }
            }
        }

        result.failed = result.failed || abort.is_cancelled() || !result.failed_ids.is_empty();

        if result.failed {
            warn!(
                succeeded = result.succeeded_ids.len(),
                failed = result.failed_ids.len(),
                not_started = result.not_started.len(),
                "Workshop downloads aborted"
            );
        } else {
            info!(succeeded = result.succeeded_ids.len(), "All workshop downloads finished");
        }

        Ok(result)
    }
}
