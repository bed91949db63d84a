// SPDX-License-Identifier: GPL-3.0-only
use tracing::info;

use crate::downloader::{DownloadError, PageFetcher};
use crate::workshop_page::classifier::{PageKind, classify_page, extract_item_ids};

/// App id plus the items to download for one workshop id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItems {
    pub app_id: String,
    pub kind: PageKind,
    pub item_ids: Vec<String>,
}

/// Fetch the workshop page of `workshop_id` and work out what to download.
///
/// A single item resolves to itself; a collection to every item it links,
/// minus the collection id.
pub async fn resolve_workshop_items(
    fetcher: &dyn PageFetcher,
    page_url: &str,
    workshop_id: &str,
) -> Result<ResolvedItems, DownloadError> {
    let html = fetcher.fetch_page(page_url).await?;
    let page = classify_page(&html)?;

    let item_ids = match page.kind {
        PageKind::Collection => {
            let ids = extract_item_ids(&html, workshop_id)?;
            info!(workshop_id, app_id = %page.app_id, items = ids.len(), "Found workshop collection");
            ids
        }
        PageKind::Single => {
            info!(workshop_id, app_id = %page.app_id, "Found single workshop item");
            vec![workshop_id.to_string()]
        }
    };

    Ok(ResolvedItems {
        app_id: page.app_id,
        kind: page.kind,
        item_ids,
    })
}
