//! Article Pipeline: one fetched document in, one normalized record out.

use crate::classify::classify_blocks;
use crate::error::ScrapeError;
use crate::models::{FetchedDocument, NormalizedRecord, RawResponse};
use crate::normalize::normalize;
use crate::prune::prune_keeping;
use crate::selectors::eval::PageContext;
use crate::sites::SiteConfig;
use crate::structured::extract_blocks;
use chrono::{DateTime, SecondsFormat, Utc};
use scraper::Html;
use serde_json::{Value, json};
use tracing::{debug, instrument};

/// Top-level keys kept even when empty.
const ALWAYS_PRESENT: [&str; 2] = ["raw_response", "parsed_data"];

/// Carve-out once the page carried a structured block: `parsed_json` stays,
/// as `{}` if nothing in it survives pruning.
const WITH_STRUCTURED: [&str; 3] = ["raw_response", "parsed_data", "parsed_json"];

/// A record plus the fields the site rules failed to fill.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: NormalizedRecord,
    pub field_misses: Vec<&'static str>,
}

/// `time_scraped` format: RFC 3339, UTC, whole seconds.
pub fn scrape_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Run extraction, classification and normalization on `doc`.
///
/// Fails with [`ScrapeError::ArticleExtractionFailed`] when the body is empty
/// or the result has neither a title nor any text.
#[instrument(level = "debug", skip_all, fields(url = %doc.url, site = %site.name))]
pub fn build_record(
    doc: &FetchedDocument,
    site: &SiteConfig,
    scraped_at: DateTime<Utc>,
    title_hint: Option<&str>,
) -> Result<Extraction, ScrapeError> {
    if doc.body_text.trim().is_empty() {
        return Err(ScrapeError::extraction(&doc.url, "empty response body"));
    }

    let document = Html::parse_document(&doc.body_text);
    let blocks = extract_blocks(&document);
    let found = blocks.found;
    let classified = classify_blocks(blocks);
    let ctx = PageContext::new(&doc.url, &document, &classified);
    let normalized = normalize(&ctx, site, title_hint);

    let mut parsed_data = normalized.data;
    parsed_data.insert(
        "time_scraped".to_string(),
        json!([scrape_timestamp(scraped_at)]),
    );

    let parsed_json = if found == 0 {
        Value::Null
    } else {
        serde_json::to_value(&classified)
            .map_err(|e| ScrapeError::extraction(&doc.url, e))?
    };

    let assembled = json!({
        "raw_response": RawResponse::of(doc),
        "parsed_json": parsed_json,
        "parsed_data": parsed_data,
    });
    let keep: &[&str] = if found > 0 {
        &WITH_STRUCTURED
    } else {
        &ALWAYS_PRESENT
    };
    let pruned = prune_keeping(assembled, keep);

    let record: NormalizedRecord =
        serde_json::from_value(pruned).map_err(|e| ScrapeError::extraction(&doc.url, e))?;
    if record.first_str("title").is_none() && record.first_str("text").is_none() {
        return Err(ScrapeError::extraction(&doc.url, "neither title nor text found"));
    }

    debug!(
        fields = record.parsed_data.len(),
        misses = normalized.misses.len(),
        "Built record"
    );
    Ok(Extraction {
        record,
        field_misses: normalized.misses,
    })
}
