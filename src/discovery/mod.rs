//! Discovery drivers: enumerate candidate article URLs for a date range.
//!
//! | Driver | Source | Dates from |
//! |--------|--------|------------|
//! | [`sitemap`] | sitemap index / urlset XML, gzip allowed | `news:publication_date`, else `lastmod` |
//! | [`archive`] | paginated HTML listing | optional per-item date selector |
//! | [`rss`] | RSS 2.0 feed | `pubDate` |
//! | [`dated`] | one index page per day | the day requested |
//!
//! A driver returns each URL once per call. Links carrying a date outside the
//! filter are dropped; undated links are kept and checked again after the
//! article is normalized.

pub mod archive;
pub mod dated;
pub mod rss;
pub mod sitemap;

use crate::dates::DateFilter;
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::DiscoveredLink;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use archive::ArchiveConfig;
pub use dated::DatedIndexConfig;
pub use self::rss::RssConfig;
pub use sitemap::SitemapConfig;

/// Enumerates article links for one site.
pub trait Discover {
    /// Every distinct candidate link for `filter`, in source order.
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError>;

    /// Whether an article with this `published_at` belongs to the crawl.
    fn date_filter(&self, filter: &DateFilter, published_at: &str) -> bool {
        filter.accepts_str(published_at)
    }
}

/// Per-site choice of driver, tagged by `driver` in the site table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    Sitemap(SitemapConfig),
    Archive(ArchiveConfig),
    Rss(RssConfig),
    DatedIndex(DatedIndexConfig),
}

impl DiscoveryConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryConfig::Sitemap(_) => "sitemap",
            DiscoveryConfig::Archive(_) => "archive",
            DiscoveryConfig::Rss(_) => "rss",
            DiscoveryConfig::DatedIndex(_) => "dated_index",
        }
    }
}

impl Discover for DiscoveryConfig {
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let links = match self {
            DiscoveryConfig::Sitemap(c) => c.discover(fetcher, filter).await?,
            DiscoveryConfig::Archive(c) => c.discover(fetcher, filter).await?,
            DiscoveryConfig::Rss(c) => c.discover(fetcher, filter).await?,
            DiscoveryConfig::DatedIndex(c) => c.discover(fetcher, filter).await?,
        };
        Ok(dedup_links(links))
    }
}

/// Drop repeated URLs, keeping the first occurrence. A later duplicate only
/// contributes a title or date the first one lacked.
pub fn dedup_links(links: Vec<DiscoveredLink>) -> Vec<DiscoveredLink> {
    let mut out: Vec<DiscoveredLink> = Vec::with_capacity(links.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for link in links {
        match seen.get(&link.url) {
            Some(&i) => {
                let kept = &mut out[i];
                kept.title = kept.title.take().or(link.title);
                kept.published = kept.published.or(link.published);
            }
            None => {
                seen.insert(link.url.clone(), out.len());
                out.push(link);
            }
        }
    }
    out
}

/// Keep links whose date is unknown or inside `filter`.
pub fn within(filter: &DateFilter, link: &DiscoveredLink) -> bool {
    link.published.is_none_or(|day| filter.accepts(day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn link(url: &str, title: Option<&str>) -> DiscoveredLink {
        DiscoveredLink {
            url: url.to_string(),
            title: title.map(str::to_string),
            published: None,
        }
    }

    #[test]
    fn test_dedup_keeps_first_and_fills_missing_metadata() {
        let links = vec![
            link("https://n.example/a", None),
            link("https://n.example/a", Some("A")),
            link("https://n.example/b", Some("B")),
            link("https://n.example/a", Some("A again")),
        ];
        let out = dedup_links(links);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://n.example/a");
        assert_eq!(out[0].title.as_deref(), Some("A"));
        assert_eq!(out[1].url, "https://n.example/b");
    }

    #[test]
    fn test_within_keeps_undated() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let filter = DateFilter::Day(today);
        assert!(within(&filter, &link("https://n.example/a", None)));
        let mut dated = link("https://n.example/b", None);
        dated.published = NaiveDate::from_ymd_opt(2024, 5, 19);
        assert!(!within(&filter, &dated));
    }

    #[test]
    fn test_discovery_config_yaml_tags() {
        let yaml = r#"{ driver: dated_index, url_template: "https://n.example/archive?d={date}", link_selector: "a.story" }"#;
        let config: DiscoveryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.kind(), "dated_index");
        let yaml = r#"{ driver: sitemap, url: "https://n.example/sitemap.xml" }"#;
        let config: DiscoveryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.kind(), "sitemap");
    }

    #[test]
    fn test_default_date_filter() {
        let config = DiscoveryConfig::Rss(RssConfig {
            feed_url: "https://n.example/rss".into(),
        });
        let filter = DateFilter::Day(NaiveDate::from_ymd_opt(2024, 5, 20).unwrap());
        assert!(config.date_filter(&filter, "2024-05-20T08:00:00+02:00"));
        assert!(!config.date_filter(&filter, "2024-05-21"));
        assert!(!config.date_filter(&filter, "yesterday"));
    }
}
