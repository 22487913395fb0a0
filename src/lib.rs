//! Site-table driven news scrapers.
//!
//! Each outlet is described once in a [`sites::SiteTable`]: how to discover its
//! article URLs and how to map its pages onto the normalized record. The
//! [`crawl::Crawler`] ties discovery, fetching and the
//! [`pipeline`] together.
//!
//! 1. **Discovery**: sitemap, archive, RSS or dated index per site
//! 2. **Fetching**: reqwest with retry, optional headless rendering
//! 3. **Normalization**: JSON-LD classification plus per-site selector maps
//! 4. **Output**: timestamped JSON files under `Links/` and `Article/`

pub mod classify;
pub mod cli;
pub mod content;
pub mod crawl;
pub mod dates;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod outputs;
pub mod pipeline;
pub mod prune;
pub mod query;
pub mod selectors;
pub mod sites;
pub mod structured;
pub mod utils;
