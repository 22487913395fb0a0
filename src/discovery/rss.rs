//! RSS 2.0 feed reader. `pubDate` is RFC 2822.

use super::{Discover, within};
use crate::dates::{DateFilter, parse_day};
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::DiscoveredLink;
use crate::utils::normalize_whitespace;
use rss::Channel;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Site-table settings for the RSS driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssConfig {
    pub feed_url: String,
}

/// Links of a feed body, in feed order. Items without a link are skipped.
pub fn feed_links(source_url: &str, body: &[u8]) -> Result<Vec<DiscoveredLink>, ScrapeError> {
    let channel = Channel::read_from(body)
        .map_err(|e| ScrapeError::discovery(source_url, format!("invalid RSS: {e}")))?;
    Ok(channel
        .items()
        .iter()
        .filter_map(|item| {
            let url = item.link().map(str::trim).filter(|l| !l.is_empty())?;
            Some(DiscoveredLink {
                url: url.to_string(),
                title: item
                    .title()
                    .map(normalize_whitespace)
                    .filter(|t| !t.is_empty()),
                published: item.pub_date().and_then(parse_day),
            })
        })
        .collect())
}

impl Discover for RssConfig {
    #[instrument(level = "info", skip_all, fields(feed = %self.feed_url))]
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let body = fetcher
            .get_bytes(&self.feed_url)
            .await
            .map_err(|e| ScrapeError::discovery(&self.feed_url, e))?;
        let links: Vec<DiscoveredLink> = feed_links(&self.feed_url, &body)?
            .into_iter()
            .filter(|l| within(filter, l))
            .collect();
        info!(links = links.len(), "Read feed");
        Ok(links)
    }
}
