// SPDX-License-Identifier: GPL-3.0-only
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::debug;

/// Whether `path` is a directory that contains at least one regular file,
/// searching subdirectories recursively.
///
/// Any filesystem error counts as "not valid"; nothing is propagated.
pub async fn validate_directory_non_empty(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {}
        _ => {
            debug!(path = %path.display(), "Content directory missing");
            return false;
        }
    }

    match contains_file(path.to_path_buf()).await {
        Ok(found) => found,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Content directory unreadable");
            false
        }
    }
}

fn contains_file(dir: PathBuf) -> Pin<Box<dyn Future<Output = std::io::Result<bool>> + Send>> {
    Box::pin(async move {
        let mut subdirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                return Ok(true);
            }
            if file_type.is_dir() {
                subdirs.push(entry.path());
            }
        }

        for subdir in subdirs {
            if contains_file(subdir).await? {
                return Ok(true);
            }
        }

        Ok(false)
    })
}
