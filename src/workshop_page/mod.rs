// SPDX-License-Identifier: GPL-3.0-only
pub mod classifier;
pub mod input;
pub mod resolver;

pub use input::parse_workshop_input;
pub use resolver::resolve_workshop_items;
