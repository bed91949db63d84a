// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override
const ENV_PREFIX: &str = "WORKSHOP_DL_";

#[cfg(target_os = "windows")]
const DEFAULT_STEAMCMD_URL: &str = "https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip";
#[cfg(target_os = "macos")]
const DEFAULT_STEAMCMD_URL: &str = "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_osx.tar.gz";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_STEAMCMD_URL: &str = "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the SteamCMD installation; workshop content lands below it
    pub steamcmd_dir: PathBuf,

    /// Archive to fetch when SteamCMD is not installed yet
    pub steamcmd_url: String,

    /// Workshop page URL, the item or collection id is appended
    pub workshop_base_url: String,

    /// Upper bound on simultaneously running SteamCMD downloads
    pub max_concurrent_downloads: usize,

    /// Attempts per workshop item before the whole run is aborted
    pub max_retries: u32,

    /// Linear backoff step: attempt N waits N * this many seconds
    pub retry_base_delay_secs: u64,

    /// Post-download validation passes
    pub validation_attempts: u32,

    /// Pause between validation passes in milliseconds
    pub validation_delay_ms: u64,

    /// Optional per-download timeout; unset means wait for SteamCMD indefinitely
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,

    /// Text SteamCMD prints on a finished download; unset disables the check
    #[serde(default)]
    pub success_marker: Option<String>,

    /// Kill downloads still running when another item exhausts its retries
    pub kill_in_flight_on_abort: bool,

    /// Attempts to fetch and unpack SteamCMD
    pub bootstrap_attempts: u32,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON log lines instead of human readable output
    pub log_json: bool,
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            Config::from_file(Path::new(&config_path))?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply `WORKSHOP_DL_*` overrides, `lookup` resolves a variable name to its value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(val) = var("STEAMCMD_DIR") {
            self.steamcmd_dir = PathBuf::from(val);
        }
        if let Some(val) = var("STEAMCMD_URL") {
            self.steamcmd_url = val;
        }
        if let Some(val) = var("WORKSHOP_BASE_URL") {
            self.workshop_base_url = val;
        }
        if let Some(val) = var("MAX_CONCURRENT_DOWNLOADS") {
            self.max_concurrent_downloads = val.parse()?;
        }
        if let Some(val) = var("MAX_RETRIES") {
            self.max_retries = val.parse()?;
        }
        if let Some(val) = var("RETRY_BASE_DELAY_SECS") {
            self.retry_base_delay_secs = val.parse()?;
        }
        if let Some(val) = var("VALIDATION_ATTEMPTS") {
            self.validation_attempts = val.parse()?;
        }
        if let Some(val) = var("VALIDATION_DELAY_MS") {
            self.validation_delay_ms = val.parse()?;
        }
        if let Some(val) = var("DOWNLOAD_TIMEOUT_SECS") {
            // 0 restores the unbounded wait
            self.download_timeout_secs = match val.parse::<u64>()? {
                0 => None,
                secs => Some(secs),
            };
        }
        if let Some(val) = var("SUCCESS_MARKER") {
            self.success_marker = (!val.is_empty()).then_some(val);
        }
        if let Some(val) = var("KILL_IN_FLIGHT_ON_ABORT") {
            self.kill_in_flight_on_abort = val.parse()?;
        }
        if let Some(val) = var("BOOTSTRAP_ATTEMPTS") {
            self.bootstrap_attempts = val.parse()?;
        }
        if let Some(val) = var("LOG_LEVEL") {
            self.log_level = val;
        }
        if let Some(val) = var("LOG_JSON") {
            self.log_json = val.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_downloads == 0 {
            anyhow::bail!("max_concurrent_downloads must be at least 1");
        }
        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }
        if self.validation_attempts == 0 {
            anyhow::bail!("validation_attempts must be at least 1");
        }
        if self.bootstrap_attempts == 0 {
            anyhow::bail!("bootstrap_attempts must be at least 1");
        }
        Ok(())
    }

    /// URL of the workshop page for an item or collection id
    pub fn workshop_page_url(&self, id: &str) -> String {
        format!("{}{}", self.workshop_base_url, id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            steamcmd_dir: PathBuf::from("steamcmd"),
            steamcmd_url: DEFAULT_STEAMCMD_URL.to_string(),
            workshop_base_url: String::from("https://steamcommunity.com/sharedfiles/filedetails/?id="),
            max_concurrent_downloads: 3,
            max_retries: 5,
            retry_base_delay_secs: 10,
            validation_attempts: 3,
            validation_delay_ms: 1000,
            download_timeout_secs: None,
            success_marker: Some(String::from("Success. Downloaded item")),
            kill_in_flight_on_abort: false,
            bootstrap_attempts: 3,
            log_level: String::from("info"),
            log_json: false,
        }
    }
}
