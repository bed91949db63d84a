// SPDX-License-Identifier: GPL-3.0-only

/// Maximum digits in a Steam id (u64::MAX has 20)
const MAX_ID_LENGTH: usize = 20;

/// Whether `id` looks like a Steam workshop item or app id
pub fn is_valid_steam_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && id.bytes().all(|b| b.is_ascii_digit())
        && id.parse::<u64>().is_ok_and(|n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_steam_id("550"));
        assert!(is_valid_steam_id("2503467894"));
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_steam_id(""));
        assert!(!is_valid_steam_id("0"));
        assert!(!is_valid_steam_id("12a4"));
        assert!(!is_valid_steam_id("-5"));
        assert!(!is_valid_steam_id(" 123"));
        assert!(!is_valid_steam_id("99999999999999999999999"));
    }
}
