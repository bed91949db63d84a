// SPDX-License-Identifier: GPL-3.0-only
pub mod content_validator;
pub mod ids;

pub use content_validator::validate_directory_non_empty;
pub use ids::is_valid_steam_id;
