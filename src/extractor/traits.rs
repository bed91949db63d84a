// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::extractor::{tar_gz::TarGzExtractor, zip::ZipExtractor};

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unpack an archive into the destination directory
    async fn extract(&self, archive_path: PathBuf, dest: PathBuf) -> anyhow::Result<()>;
}

/// Pick an extractor from the archive file name
pub fn extractor_for(archive_path: &Path) -> anyhow::Result<Box<dyn Extractor>> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.ends_with(".zip") {
        Ok(Box::new(ZipExtractor::new()))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(Box::new(TarGzExtractor::new()))
    } else {
        Err(anyhow::anyhow!("Unsupported archive type: {}", archive_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_for_known_archives() {
        assert!(extractor_for(Path::new("steamcmd.zip")).is_ok());
        assert!(extractor_for(Path::new("/tmp/STEAMCMD.ZIP")).is_ok());
        assert!(extractor_for(Path::new("steamcmd_linux.tar.gz")).is_ok());
        assert!(extractor_for(Path::new("steamcmd.tgz")).is_ok());
    }

    #[test]
    fn test_extractor_for_unknown_archive() {
        let result = extractor_for(Path::new("steamcmd.rar"));
        assert!(result.is_err());
    }
}
