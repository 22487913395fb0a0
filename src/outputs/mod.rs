//! Output files.
//!
//! - [`json`]: timestamped link and article files for one crawl

pub mod json;
