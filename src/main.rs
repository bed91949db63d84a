// SPDX-License-Identifier: GPL-3.0-only
mod config;
mod downloader;
mod extractor;
mod logging;
mod utils;
mod workshop_page;

#[cfg(test)]
mod test_helpers;

use std::process::ExitCode;
use std::sync::Arc;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use config::Config;
use downloader::{
    DownloadSettings, HttpClient, Orchestrator, ProcessRunner, SteamCmd, SystemProcessRunner,
    WorkshopDownloader,
};
use logging::setup_logging;
use workshop_page::{parse_workshop_input, resolve_workshop_items};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("\nFatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Ask for the item or collection id on stdin
async fn prompt_for_id() -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Enter a workshop item or collection id (or URL): ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read workshop id from stdin")?;

    Ok(line)
}

/// Returns whether every item was downloaded
async fn run() -> anyhow::Result<bool> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level, config.log_json)?;

    info!("Starting SteamWorkshopDL v{}", env!("CARGO_PKG_VERSION"));

    let client = HttpClient::new()?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner::new());
    let steamcmd = Arc::new(SteamCmd::from_config(&config));
    info!(steamcmd_dir = %steamcmd.dir().display(), "Using SteamCMD directory");

    // SteamCMD must be usable before anything is asked of the user
    steamcmd.ensure_installed(&client).await?;
    steamcmd.initialize(runner.as_ref()).await?;

    let raw_input = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => prompt_for_id().await?,
    };
    let workshop_id = parse_workshop_input(&raw_input)?;

    let resolved = resolve_workshop_items(&client, &config.workshop_page_url(&workshop_id), &workshop_id).await?;
    if resolved.item_ids.is_empty() {
        warn!(workshop_id = %workshop_id, "Collection contains no items, nothing to download");
        return Ok(true);
    }

    let downloader = Arc::new(WorkshopDownloader::new(
        Arc::clone(&steamcmd),
        Arc::clone(&runner),
        DownloadSettings::from(&config),
    ));
    let orchestrator = Orchestrator::new(downloader, config.max_concurrent_downloads)?;

    let result = orchestrator.run(&resolved.app_id, resolved.item_ids).await?;

    info!(
        succeeded = result.succeeded_ids.len(),
        peak_concurrency = orchestrator.peak_in_flight(),
        content_dir = %steamcmd.content_root(&resolved.app_id).display(),
        "Download summary"
    );
    for item_id in &result.failed_ids {
        error!(item_id = %item_id, "Workshop item failed");
    }
    if !result.not_started.is_empty() {
        warn!(items = ?result.not_started, "Workshop items skipped after abort");
    }

    if result.failed {
        eprintln!(
            "\nDownload aborted: {} succeeded, {} failed, {} not started",
            result.succeeded_ids.len(),
            result.failed_ids.len(),
            result.not_started.len()
        );
    } else {
        println!("\nAll {} workshop item(s) downloaded.", result.succeeded_ids.len());
    }

    Ok(result.exit_code() == 0)
}
