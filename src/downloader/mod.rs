// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod client;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod steamcmd;
pub mod workshop;

pub use traits::{PageFetcher, ProcessRunner};
pub use client::HttpClient;
pub use error::DownloadError;
pub use orchestrator::Orchestrator;
pub use process::SystemProcessRunner;
pub use steamcmd::SteamCmd;
pub use workshop::{DownloadSettings, WorkshopDownloader};
