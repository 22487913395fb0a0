//! Paginated archive crawler.
//!
//! Walks `url_template` with `{page}` = `first_page`, `first_page + 1`, ...
//! and stops at `max_pages`, at the first page without links, or after a
//! page whose dated links are all older than the range start. The HTML
//! listing reader is shared with the dated-index driver.

use super::{Discover, within};
use crate::dates::{DateFilter, parse_day};
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::DiscoveredLink;
use crate::selectors::eval::{StrategyError, compiled};
use crate::utils::{normalize_whitespace, resolve_url};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

fn default_first_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    5
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

/// How to read links off an index page.
///
/// With `item_selector`, each matching element is one story: its first link
/// is the URL and `date_selector` is looked up inside it. Without it, every
/// link matching `link_selector` in the page is a story and carries no date.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub item_selector: Option<String>,
    pub link_selector: String,
    pub date_selector: Option<String>,
    /// Attribute holding the date; the element text when absent.
    pub date_attr: Option<String>,
}

impl Default for Listing {
    fn default() -> Self {
        Self {
            item_selector: None,
            link_selector: default_link_selector(),
            date_selector: None,
            date_attr: None,
        }
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn link_from(el: ElementRef<'_>, base_url: &str) -> Option<DiscoveredLink> {
    let href = el.value().attr("href").map(str::trim).filter(|h| !h.is_empty())?;
    if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    let title = Some(text_of(el)).filter(|t| !t.is_empty());
    Some(DiscoveredLink {
        url: resolve_url(base_url, href),
        title,
        published: None,
    })
}

impl Listing {
    fn date_in(&self, item: ElementRef<'_>, sel: &Selector) -> Option<chrono::NaiveDate> {
        let el = item.select(sel).next()?;
        match &self.date_attr {
            Some(attr) => el.value().attr(attr).and_then(parse_day),
            None => parse_day(&text_of(el)),
        }
    }

    /// Read every story link of `html`, in document order.
    pub fn read(&self, html: &str, base_url: &str) -> Result<Vec<DiscoveredLink>, StrategyError> {
        let document = Html::parse_document(html);
        let link_sel = compiled(&self.link_selector)?;

        let Some(item_css) = &self.item_selector else {
            return Ok(document
                .select(&link_sel)
                .filter_map(|el| link_from(el, base_url))
                .collect());
        };

        let item_sel = compiled(item_css)?;
        let date_sel = self.date_selector.as_deref().map(compiled).transpose()?;
        Ok(document
            .select(&item_sel)
            .filter_map(|item| {
                let mut link = item
                    .select(&link_sel)
                    .find_map(|el| link_from(el, base_url))?;
                link.published = date_sel.as_ref().and_then(|sel| self.date_in(item, sel));
                Some(link)
            })
            .collect())
    }
}

pub(crate) fn listing_error(url: &str, e: StrategyError) -> ScrapeError {
    ScrapeError::Config(format!("bad listing selectors for {url}: {e}"))
}

/// Site-table settings for the archive driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Page URL with a `{page}` placeholder.
    pub url_template: String,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub date_attr: Option<String>,
}

impl ArchiveConfig {
    fn listing(&self) -> Listing {
        Listing {
            item_selector: self.item_selector.clone(),
            link_selector: self.link_selector.clone(),
            date_selector: self.date_selector.clone(),
            date_attr: self.date_attr.clone(),
        }
    }

    fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

impl Discover for ArchiveConfig {
    #[instrument(level = "info", skip_all, fields(template = %self.url_template))]
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let listing = self.listing();
        let mut links = Vec::new();

        for page in self.first_page..self.first_page.saturating_add(self.max_pages) {
            let url = self.page_url(page);
            let doc = match fetcher.get_text(&url).await {
                Ok(doc) => doc,
                Err(e) if page == self.first_page => {
                    return Err(ScrapeError::discovery(&url, e));
                }
                Err(e) => {
                    warn!(%url, error = %e, "Archive page failed; stopping pagination");
                    break;
                }
            };

            let found = listing
                .read(&doc.body_text, &doc.url)
                .map_err(|e| listing_error(&url, e))?;
            if found.is_empty() {
                debug!(page, "Empty archive page; stopping");
                break;
            }

            let all_older = found
                .iter()
                .all(|l| l.published.is_some_and(|d| d < filter.start()));
            links.extend(found.into_iter().filter(|l| within(filter, l)));
            if all_older {
                debug!(page, "Archive page older than range; stopping");
                break;
            }
        }

        info!(links = links.len(), "Archive walk finished");
        Ok(links)
    }
}
