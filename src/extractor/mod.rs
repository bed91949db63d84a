// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod zip;
pub mod tar_gz;

pub use traits::extractor_for;
