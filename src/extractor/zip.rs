// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use crate::extractor::traits::Extractor;
use zip::ZipArchive;

pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for ZipExtractor {
    async fn extract(&self, archive_path: PathBuf, dest: PathBuf) -> anyhow::Result<()> {
        info!(archive = %archive_path.display(), dest = %dest.display(), "Extracting ZIP archive");

        tokio::fs::create_dir_all(&dest).await?;

        let archive_path_clone = archive_path.clone();
        let dest_clone = dest.clone();

        let count = tokio::task::spawn_blocking(move || {
            let file = File::open(&archive_path_clone)?;
            let mut archive = ZipArchive::new(BufReader::new(file))?;

            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                let outpath = match entry.enclosed_name() {
                    Some(path) => dest_clone.join(path),
                    None => continue,
                };

                if entry.is_dir() {
                    std::fs::create_dir_all(&outpath)?;
                    continue;
                }

                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&outpath)?;
                std::io::copy(&mut entry, &mut outfile)?;

                // Keep the executable bit on the SteamCMD launcher
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode() {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                }
            }

            Ok::<usize, anyhow::Error>(archive.len())
        })
        .await??;

        info!(archive = %archive_path.display(), dest = %dest.display(), entries = count, "ZIP extraction completed");
        Ok(())
    }
}

impl Default for ZipExtractor {
    fn default() -> Self {
        Self::new()
    }
}
