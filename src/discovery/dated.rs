//! Date-parameterized index pages: one listing per day of the range.

use super::archive::{Listing, listing_error};
use super::{Discover, within};
use crate::dates::DateFilter;
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::DiscoveredLink;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::{info, instrument, warn};

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

/// Site-table settings for the dated-index driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedIndexConfig {
    /// Index URL with a `{date}` placeholder.
    pub url_template: String,
    /// chrono format for `{date}`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Percent-encode the rendered date (formats containing `/` or spaces).
    #[serde(default)]
    pub encode_date: bool,
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub date_attr: Option<String>,
}

impl DatedIndexConfig {
    pub fn day_url(&self, day: NaiveDate) -> Result<String, ScrapeError> {
        let mut rendered = String::new();
        write!(rendered, "{}", day.format(&self.date_format)).map_err(|_| {
            ScrapeError::Config(format!("invalid date_format {:?}", self.date_format))
        })?;
        let rendered = if self.encode_date {
            urlencoding::encode(&rendered).into_owned()
        } else {
            rendered
        };
        Ok(self.url_template.replace("{date}", &rendered))
    }

    fn listing(&self) -> Listing {
        Listing {
            item_selector: self.item_selector.clone(),
            link_selector: self.link_selector.clone(),
            date_selector: self.date_selector.clone(),
            date_attr: self.date_attr.clone(),
        }
    }

    async fn day_links<F: Fetch>(
        &self,
        fetcher: &F,
        listing: &Listing,
        day: NaiveDate,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let url = self.day_url(day)?;
        let doc = fetcher
            .get_text(&url)
            .await
            .map_err(|e| ScrapeError::discovery(&url, e))?;
        let mut links = listing
            .read(&doc.body_text, &doc.url)
            .map_err(|e| listing_error(&url, e))?;
        for link in &mut links {
            link.published.get_or_insert(day);
        }
        Ok(links)
    }
}

impl Discover for DatedIndexConfig {
    /// A day that fails is logged and skipped. Fails only when every day failed.
    #[instrument(level = "info", skip_all, fields(template = %self.url_template))]
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let listing = self.listing();
        let mut links = Vec::new();
        let mut last_error = None;
        let mut ok_days = 0usize;

        for day in filter.days() {
            match self.day_links(fetcher, &listing, day).await {
                Ok(found) => {
                    ok_days += 1;
                    links.extend(found.into_iter().filter(|l| within(filter, l)));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%day, error = %e, "Discovery failed for day");
                    last_error = Some(e);
                }
            }
        }

        if ok_days == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        info!(links = links.len(), days = ok_days, "Dated index walk finished");
        Ok(links)
    }
}
