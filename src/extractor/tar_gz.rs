// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tar::Archive;
use tracing::info;
use crate::extractor::traits::Extractor;

pub struct TarGzExtractor;

impl TarGzExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for TarGzExtractor {
    async fn extract(&self, archive_path: PathBuf, dest: PathBuf) -> anyhow::Result<()> {
        info!(archive = %archive_path.display(), dest = %dest.display(), "Extracting tar.gz archive");

        tokio::fs::create_dir_all(&dest).await?;

        let archive_path_clone = archive_path.clone();
        let dest_clone = dest.clone();

        tokio::task::spawn_blocking(move || {
            let file = File::open(&archive_path_clone)?;
            let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
            archive.set_preserve_permissions(true);
            // `unpack` refuses entries that would land outside `dest`
            archive.unpack(&dest_clone)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        info!(archive = %archive_path.display(), dest = %dest.display(), "tar.gz extraction completed");
        Ok(())
    }
}

impl Default for TarGzExtractor {
    fn default() -> Self {
        Self::new()
    }
}
