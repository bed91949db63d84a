// SPDX-License-Identifier: GPL-3.0-only
use regex::Regex;
use std::collections::HashSet;

use crate::downloader::DownloadError;

/// Present only in the markup of collection pages
const COLLECTION_MARKER: &str = "collectionItemDetails";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Single,
    Collection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub kind: PageKind,
    pub app_id: String,
}

fn compile(pattern: &str) -> Result<Regex, DownloadError> {
    Regex::new(pattern).map_err(|e| DownloadError::PageFormat(e.to_string()))
}

/// Determine the owning app id and whether the page is a collection
pub fn classify_page(html: &str) -> Result<PageInfo, DownloadError> {
    let app_id_re = compile(r"https://steamcommunity\.com/app/(\d+)")?;

    let app_id = app_id_re
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DownloadError::PageFormat("app id not found on workshop page".to_string()))?;

    let kind = if html.contains(COLLECTION_MARKER) {
        PageKind::Collection
    } else {
        PageKind::Single
    };

    Ok(PageInfo { kind, app_id })
}

/// Every item id linked from the page except `exclude_id`, deduplicated in first-seen order
pub fn extract_item_ids(html: &str, exclude_id: &str) -> Result<Vec<String>, DownloadError> {
    let item_re = compile(r"filedetails/\?id=(\d+)")?;

    let mut seen = HashSet::new();
    let ids = item_re
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|id| *id != exclude_id)
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect();

    Ok(ids)
}
