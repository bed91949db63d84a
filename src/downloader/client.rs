// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::downloader::{error::DownloadError, traits::PageFetcher};

/// Minimum gap between two progress lines of a file download
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300)) // 5 minute timeout for the SteamCMD bundle
            .user_agent(concat!("SteamWorkshopDL/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Stream `url` into `output_path`, logging progress while it runs.
    ///
    /// A body shorter than the advertised Content-Length removes the partial
    /// file and fails.
    pub async fn download_to_file(&self, url: &str, output_path: &Path) -> Result<u64, DownloadError> {
        info!(url = %url, path = %output_path.display(), "Starting download");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let expected = response.content_length();

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                match expected {
                    Some(total) if total > 0 => info!(
                        downloaded_kb = written / 1024,
                        total_kb = total / 1024,
                        percent = written * 100 / total,
                        "Download progress"
                    ),
                    _ => info!(downloaded_kb = written / 1024, "Download progress"),
                }
                last_report = Instant::now();
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(total) = expected {
            if total != written {
                let _ = tokio::fs::remove_file(output_path).await;
                return Err(DownloadError::Bootstrap(format!(
                    "incomplete download of {url}: got {written} of {total} bytes"
                )));
            }
        }

        info!(url = %url, path = %output_path.display(), bytes = written, "Download completed");
        Ok(written)
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &str) -> Result<String, DownloadError> {
        debug!(url = %url, "Fetching page");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        debug!(url = %url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
