//! Timestamped JSON output files.
//!
//! ```text
//! output_dir/
//! ├── Links/
//! │   └── premiumtimes-sitemap-2024-05-20_08-30-00.json
//! └── Article/
//!     └── premiumtimes-articles-2024-05-20_08-30-00.json
//! ```
//!
//! Pretty-printed UTF-8; non-ASCII text is written as-is.

use crate::models::{DiscoveredLink, NormalizedRecord};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const LINKS_DIR: &str = "Links";
pub const ARTICLES_DIR: &str = "Article";

/// `<site>-<kind>-<YYYY-MM-DD_HH-MM-SS>.json`
pub fn file_name(site: &str, kind: &str, at: NaiveDateTime) -> String {
    format!("{site}-{kind}-{}.json", at.format("%Y-%m-%d_%H-%M-%S"))
}

async fn write_pretty<T: Serialize + ?Sized>(
    value: &T,
    dir: PathBuf,
    name: String,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;

    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = dir.join(name);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}

/// Write discovered links to `Links/<site>-sitemap-<ts>.json`.
#[instrument(level = "info", skip_all, fields(site, count = links.len()))]
pub async fn write_links(
    links: &[DiscoveredLink],
    site: &str,
    output_dir: &Path,
    at: NaiveDateTime,
) -> Result<PathBuf, Box<dyn Error>> {
    write_pretty(links, output_dir.join(LINKS_DIR), file_name(site, "sitemap", at)).await
}

/// Write normalized records to `Article/<site>-articles-<ts>.json`.
#[instrument(level = "info", skip_all, fields(site, count = records.len()))]
pub async fn write_records(
    records: &[NormalizedRecord],
    site: &str,
    output_dir: &Path,
    at: NaiveDateTime,
) -> Result<PathBuf, Box<dyn Error>> {
    write_pretty(records, output_dir.join(ARTICLES_DIR), file_name(site, "articles", at)).await
}
