//! Crawl orchestration: discover, fetch, normalize, accumulate.
//!
//! Per-URL failures are logged and counted, never propagated. Only fatal
//! errors (bad query, bad configuration) abort a run.

use crate::dates::DateFilter;
use crate::discovery::Discover;
use crate::error::ScrapeError;
use crate::fetch::{Fetch, NoRender, Render};
use crate::models::{DiscoveredLink, FetchedDocument, NormalizedRecord};
use crate::pipeline::build_record;
use crate::query::{CrawlPlan, CrawlQuery};
use crate::sites::SiteConfig;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// In-flight article fetches per crawl.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub discovered: usize,
    pub discovery_failed: bool,
    pub fetched: usize,
    pub rendered: usize,
    pub emitted: usize,
    pub fetch_failed: usize,
    pub extraction_failed: usize,
    /// Dropped after normalization because `published_at` fell outside the range.
    pub out_of_range: usize,
    /// Field name to number of records where no strategy matched.
    pub field_misses: BTreeMap<&'static str, usize>,
}

impl CrawlStats {
    pub fn log_summary(&self, site: &str) {
        info!(
            site,
            discovered = self.discovered,
            discovery_failed = self.discovery_failed,
            fetched = self.fetched,
            rendered = self.rendered,
            emitted = self.emitted,
            fetch_failed = self.fetch_failed,
            extraction_failed = self.extraction_failed,
            out_of_range = self.out_of_range,
            field_misses = ?self.field_misses,
            "Crawl summary"
        );
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub links: Vec<DiscoveredLink>,
    /// In completion order.
    pub records: Vec<NormalizedRecord>,
    pub stats: CrawlStats,
}

enum ArticleResult {
    Emitted {
        record: Box<NormalizedRecord>,
        misses: Vec<&'static str>,
        rendered: bool,
    },
    OutOfRange {
        misses: Vec<&'static str>,
        rendered: bool,
    },
    FetchFailed,
    ExtractionFailed {
        rendered: bool,
    },
}

/// Runs queries against one site.
pub struct Crawler<'a, F, R = NoRender> {
    site: &'a SiteConfig,
    fetcher: &'a F,
    renderer: R,
    concurrency: usize,
}

impl<'a, F: Fetch> Crawler<'a, F, NoRender> {
    pub fn new(site: &'a SiteConfig, fetcher: &'a F) -> Self {
        Self {
            site,
            fetcher,
            renderer: NoRender,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl<'a, F: Fetch, R: Render> Crawler<'a, F, R> {
    pub fn with_renderer<R2: Render>(self, renderer: R2) -> Crawler<'a, F, R2> {
        Crawler {
            site: self.site,
            fetcher: self.fetcher,
            renderer,
            concurrency: self.concurrency,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Validate `query`, then run it. `today` anchors the default one-day range.
    #[instrument(level = "info", skip_all, fields(site = %self.site.name))]
    pub async fn run(
        &self,
        query: &CrawlQuery,
        today: NaiveDate,
    ) -> Result<CrawlOutcome, ScrapeError> {
        let t0 = Instant::now();
        let mut outcome = CrawlOutcome::default();

        let (filter, fetch_articles) = match query.plan(today)? {
            CrawlPlan::Single { link } => {
                outcome.links.push(DiscoveredLink::new(link));
                (None, true)
            }
            CrawlPlan::Discover {
                filter,
                fetch_articles,
            } => {
                match self.site.discovery.discover(self.fetcher, &filter).await {
                    Ok(links) => outcome.links = links,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!(driver = self.site.discovery.kind(), error = %e, "Discovery failed");
                        outcome.stats.discovery_failed = true;
                    }
                }
                (Some(filter), fetch_articles)
            }
        };
        outcome.stats.discovered = outcome.links.len();
        info!(links = outcome.links.len(), "Discovered links");

        if fetch_articles {
            let results: Vec<ArticleResult> = stream::iter(outcome.links.iter())
                .map(|link| self.article(link, filter.as_ref()))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            for result in results {
                record_result(&mut outcome, result);
            }
        }

        outcome.stats.log_summary(&self.site.name);
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Crawl finished");
        Ok(outcome)
    }

    /// Plain fetch, replaced by the rendered page for sites with a render rule.
    async fn fetch_page(&self, url: &str) -> Result<(FetchedDocument, bool), ScrapeError> {
        let doc = self.fetcher.get_text(url).await?;
        let Some(rule) = &self.site.render else {
            return Ok((doc, false));
        };
        match tokio::time::timeout(rule.timeout(), self.renderer.render(url, rule)).await {
            Ok(Ok(html)) if !html.trim().is_empty() => Ok((
                FetchedDocument {
                    body_text: html,
                    ..doc
                },
                true,
            )),
            Ok(Ok(_)) => {
                warn!(%url, "Renderer returned an empty page; using plain body");
                Ok((doc, false))
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "Render failed; using plain body");
                Ok((doc, false))
            }
            Err(_) => {
                warn!(%url, timeout = ?rule.timeout(), "Render timed out; using plain body");
                Ok((doc, false))
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(url = %link.url))]
    async fn article(&self, link: &DiscoveredLink, filter: Option<&DateFilter>) -> ArticleResult {
        let (doc, rendered) = match self.fetch_page(&link.url).await {
            Ok(page) => page,
            Err(e) => {
                error!(url = %link.url, error = %e, "Fetch failed");
                return ArticleResult::FetchFailed;
            }
        };

        let extraction = match build_record(&doc, self.site, Utc::now(), link.title.as_deref()) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(url = %link.url, error = %e, "Article extraction failed");
                return ArticleResult::ExtractionFailed { rendered };
            }
        };

        // links dated by discovery were already filtered
        if let (Some(filter), None) = (filter, link.published) {
            if let Some(published) = extraction.record.first_str("published_at") {
                if !self.site.discovery.date_filter(filter, published) {
                    debug!(url = %link.url, published, "Outside date range");
                    return ArticleResult::OutOfRange {
                        misses: extraction.field_misses,
                        rendered,
                    };
                }
            }
        }

        ArticleResult::Emitted {
            record: Box::new(extraction.record),
            misses: extraction.field_misses,
            rendered,
        }
    }
}

fn record_result(outcome: &mut CrawlOutcome, result: ArticleResult) {
    let stats = &mut outcome.stats;
    let (misses, rendered) = match result {
        ArticleResult::FetchFailed => {
            stats.fetch_failed += 1;
            return;
        }
        ArticleResult::ExtractionFailed { rendered } => {
            stats.fetched += 1;
            stats.extraction_failed += 1;
            (Vec::new(), rendered)
        }
        ArticleResult::OutOfRange { misses, rendered } => {
            stats.fetched += 1;
            stats.out_of_range += 1;
            (misses, rendered)
        }
        ArticleResult::Emitted {
            record,
            misses,
            rendered,
        } => {
            stats.fetched += 1;
            stats.emitted += 1;
            outcome.records.push(*record);
            (misses, rendered)
        }
    };
    if rendered {
        stats.rendered += 1;
    }
    for field in misses {
        *stats.field_misses.entry(field).or_default() += 1;
    }
}
