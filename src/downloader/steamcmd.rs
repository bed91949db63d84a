// SPDX-License-Identifier: GPL-3.0-only
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::downloader::{
    client::HttpClient,
    error::DownloadError,
    traits::{CommandSpec, ProcessRunner},
};
use crate::extractor::extractor_for;

#[cfg(target_os = "windows")]
const STEAMCMD_EXECUTABLE: &str = "steamcmd.exe";
#[cfg(not(target_os = "windows"))]
const STEAMCMD_EXECUTABLE: &str = "steamcmd.sh";

/// Output kept in error messages
const OUTPUT_EXCERPT_LEN: usize = 200;

/// Location of a SteamCMD installation and the command lines it understands
#[derive(Debug, Clone)]
pub struct SteamCmd {
    dir: PathBuf,
    archive_url: String,
    bootstrap_attempts: u32,
    bootstrap_delay: Duration,
}

impl SteamCmd {
    pub fn new(dir: PathBuf, archive_url: String) -> Self {
        Self {
            dir,
            archive_url,
            bootstrap_attempts: 3,
            bootstrap_delay: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.steamcmd_dir.clone(), config.steamcmd_url.clone())
            .with_bootstrap(config.bootstrap_attempts, Duration::from_secs(5))
    }

    /// Attempts for `ensure_installed`; attempt N is followed by an `N * delay` pause
    pub fn with_bootstrap(mut self, attempts: u32, delay: Duration) -> Self {
        self.bootstrap_attempts = attempts.max(1);
        self.bootstrap_delay = delay;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn executable(&self) -> PathBuf {
        self.dir.join(STEAMCMD_EXECUTABLE)
    }

    /// Parent of every downloaded item of `app_id`
    pub fn content_root(&self, app_id: &str) -> PathBuf {
        self.dir.join("steamapps").join("workshop").join("content").join(app_id)
    }

    /// Where SteamCMD places a downloaded workshop item
    pub fn content_dir(&self, app_id: &str, item_id: &str) -> PathBuf {
        self.content_root(app_id).join(item_id)
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec {
            program: self.executable(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: self.dir.clone(),
        }
    }

    /// Anonymous login followed by quit; lets SteamCMD self-update on first run
    pub fn init_command(&self) -> CommandSpec {
        self.command(&["+login", "anonymous", "+quit"])
    }

    pub fn download_command(&self, app_id: &str, item_id: &str) -> CommandSpec {
        self.command(&[
            "+login",
            "anonymous",
            "+workshop_download_item",
            app_id,
            item_id,
            "+quit",
        ])
    }

    /// Download and unpack SteamCMD unless the executable is already present
    pub async fn ensure_installed(&self, client: &HttpClient) -> Result<(), DownloadError> {
        if self.executable().exists() {
            info!(path = %self.executable().display(), "SteamCMD already installed");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = self
            .archive_url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("steamcmd.zip");
        let archive_path = self.dir.join(format!("{}-{}", Uuid::new_v4(), file_name));

        let mut last_error = None;

        for attempt in 1..=self.bootstrap_attempts {
            info!(attempt, max = self.bootstrap_attempts, url = %self.archive_url, "Installing SteamCMD");

            match self.install_once(client, &archive_path).await {
                Ok(()) => {
                    info!(path = %self.executable().display(), "SteamCMD installed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "SteamCMD installation attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < self.bootstrap_attempts {
                tokio::time::sleep(self.bootstrap_delay * attempt).await;
            }
        }

        Err(DownloadError::Bootstrap(format!(
            "could not install SteamCMD after {} attempts: {}",
            self.bootstrap_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn install_once(&self, client: &HttpClient, archive_path: &Path) -> Result<(), DownloadError> {
        let result = async {
            client.download_to_file(&self.archive_url, archive_path).await?;

            let extractor = extractor_for(archive_path)
                .map_err(|e| DownloadError::Bootstrap(e.to_string()))?;
            extractor
                .extract(archive_path.to_path_buf(), self.dir.clone())
                .await
                .map_err(|e| DownloadError::Bootstrap(format!("extraction failed: {e:#}")))?;

            if !self.executable().exists() {
                return Err(DownloadError::Bootstrap(format!(
                    "{} missing after extraction",
                    self.executable().display()
                )));
            }

            Ok(())
        }
        .await;

        if let Err(e) = tokio::fs::remove_file(archive_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, path = %archive_path.display(), "Failed to clean up SteamCMD archive");
            }
        }

        result
    }

    /// First run: log in anonymously and quit, waiting as long as it takes
    pub async fn initialize(&self, runner: &dyn ProcessRunner) -> Result<(), DownloadError> {
        info!("Initializing SteamCMD");

        let output = runner.run(&self.init_command(), None, None).await?;
        if !output.success() {
            return Err(DownloadError::Bootstrap(format!(
                "SteamCMD initialization exited with {:?}: {}",
                output.exit_code,
                excerpt(&output.output)
            )));
        }

        info!("SteamCMD initialized");
        Ok(())
    }
}

/// Leading part of process output, cut on a char boundary
pub fn excerpt(output: &str) -> String {
    output.trim().chars().take(OUTPUT_EXCERPT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedRunner, Step};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            for (name, data) in entries {
                zip.start_file(*name, FileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_download_command_line() {
        let steamcmd = SteamCmd::new(PathBuf::from("/opt/steamcmd"), String::new());
        let command = steamcmd.download_command("550", "123");

        assert_eq!(command.program, PathBuf::from("/opt/steamcmd").join(STEAMCMD_EXECUTABLE));
        assert_eq!(
            command.args,
            vec!["+login", "anonymous", "+workshop_download_item", "550", "123", "+quit"]
        );
        assert_eq!(command.working_dir, PathBuf::from("/opt/steamcmd"));
    }

    #[test]
    fn test_init_command_line() {
        let steamcmd = SteamCmd::new(PathBuf::from("/opt/steamcmd"), String::new());
        assert_eq!(steamcmd.init_command().args, vec!["+login", "anonymous", "+quit"]);
    }

    #[test]
    fn test_content_dir_layout() {
        let steamcmd = SteamCmd::new(PathBuf::from("/opt/steamcmd"), String::new());
        assert_eq!(
            steamcmd.content_dir("550", "123"),
            PathBuf::from("/opt/steamcmd/steamapps/workshop/content/550/123")
        );
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), OUTPUT_EXCERPT_LEN);
        assert_eq!(excerpt("  short \n"), "short");
    }

    #[tokio::test]
    async fn test_ensure_installed_skips_existing() {
        let temp_dir = TempDir::new().unwrap();
        let steamcmd = SteamCmd::new(temp_dir.path().to_path_buf(), "http://127.0.0.1:1/none.zip".into());
        File::create(steamcmd.executable()).unwrap();

        // No server behind the URL, so any download attempt would fail
        steamcmd.ensure_installed(&HttpClient::new().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_installed_downloads_and_extracts() {
        let mut server = mockito::Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();

        let mock = server.mock("GET", "/installer/steamcmd.zip")
            .with_status(200)
            .with_body(zip_with(&[(STEAMCMD_EXECUTABLE, b"launcher")]))
            .create_async()
            .await;

        let steamcmd = SteamCmd::new(
            temp_dir.path().join("steamcmd"),
            format!("{}/installer/steamcmd.zip", server.url()),
        );
        steamcmd.ensure_installed(&HttpClient::new().unwrap()).await.unwrap();

        assert!(steamcmd.executable().exists());
        // Only the executable is left, the archive is removed
        let leftovers: Vec<_> = std::fs::read_dir(steamcmd.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".zip"))
            .collect();
        assert!(leftovers.is_empty());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ensure_installed_retries_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();

        let mock = server.mock("GET", "/steamcmd.zip")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let steamcmd = SteamCmd::new(temp_dir.path().to_path_buf(), format!("{}/steamcmd.zip", server.url()))
            .with_bootstrap(2, Duration::from_millis(10));
        let result = steamcmd.ensure_installed(&HttpClient::new().unwrap()).await;

        assert!(matches!(result, Err(DownloadError::Bootstrap(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ensure_installed_archive_without_executable() {
        let mut server = mockito::Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();

        let _mock = server.mock("GET", "/steamcmd.zip")
            .with_status(200)
            .with_body(zip_with(&[("readme.txt", b"hi")]))
            .create_async()
            .await;

        let steamcmd = SteamCmd::new(temp_dir.path().to_path_buf(), format!("{}/steamcmd.zip", server.url()))
            .with_bootstrap(1, Duration::from_millis(1));
        let result = steamcmd.ensure_installed(&HttpClient::new().unwrap()).await;

        assert!(result.unwrap_err().to_string().contains("missing after extraction"));
    }

    #[tokio::test]
    async fn test_initialize_success() {
        let temp_dir = TempDir::new().unwrap();
        let steamcmd = SteamCmd::new(temp_dir.path().to_path_buf(), String::new());
        let runner = ScriptedRunner::new();

        steamcmd.initialize(&runner).await.unwrap();
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].args, steamcmd.init_command().args);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let steamcmd = SteamCmd::new(temp_dir.path().to_path_buf(), String::new());
        let runner = ScriptedRunner::new().with_init(Step::Fail(7));

        let result = steamcmd.initialize(&runner).await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("initialization"));
    }
}
