// SPDX-License-Identifier: GPL-3.0-only
use regex::Regex;
use url::Url;

use crate::downloader::DownloadError;
use crate::utils::is_valid_steam_id;

/// Resolve what the user typed at the prompt to a workshop id.
///
/// Accepts a bare numeric id or a `steamcommunity.com/sharedfiles/filedetails/?id=`
/// (or `/workshop/filedetails/`) URL.
pub fn parse_workshop_input(input: &str) -> Result<String, DownloadError> {
    let input = input.trim();

    if is_valid_steam_id(input) {
        return Ok(input.to_string());
    }

    if let Ok(parsed_url) = Url::parse(input) {
        let is_steam = parsed_url
            .host_str()
            .map(|h| h.ends_with("steamcommunity.com"))
            .unwrap_or(false);

        if is_steam && parsed_url.path().contains("filedetails") {
            if let Some((_, id)) = parsed_url.query_pairs().find(|(key, _)| key == "id") {
                if is_valid_steam_id(&id) {
                    return Ok(id.into_owned());
                }
            }
        }
    }

    // Scheme-less URLs such as "steamcommunity.com/sharedfiles/filedetails/?id=1"
    let workshop_re = Regex::new(r"steamcommunity\.com/(?:sharedfiles|workshop)/filedetails/?\?(?:.*&)?id=(\d+)")
        .map_err(|e| DownloadError::InvalidInput(e.to_string()))?;
    if let Some(caps) = workshop_re.captures(input) {
        if let Some(id) = caps.get(1).map(|m| m.as_str()) {
            if is_valid_steam_id(id) {
                return Ok(id.to_string());
            }
        }
    }

    Err(DownloadError::InvalidInput(format!(
        "'{}' is neither a workshop id nor a workshop URL",
        input
    )))
}
