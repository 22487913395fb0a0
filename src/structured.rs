//! Structured-data extraction.
//!
//! Collects the payloads of every `<script type="application/ld+json">` and
//! `<script type="application/json">` element, strips control whitespace and
//! decodes them. A payload that fails to decode is logged and skipped.
//! A payload that decodes to a top-level array contributes one block per
//! element so that each block is a single JSON-LD node.

use crate::error::ScrapeError;
use crate::models::StructuredBlocks;
use crate::utils::{strip_control_whitespace, truncate_for_log};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script[type]").unwrap());

const LD_JSON: &str = "application/ld+json";
const PLAIN_JSON: &str = "application/json";

/// Decode one script payload.
pub fn decode_block(raw: &str) -> Result<Value, ScrapeError> {
    let cleaned = strip_control_whitespace(raw);
    serde_json::from_str(cleaned.trim()).map_err(|e| ScrapeError::StructuredDataDecode {
        reason: format!("{e} in {}", truncate_for_log(cleaned.trim(), 120)),
    })
}

/// Extract and decode all JSON blocks of a parsed document, in document order.
pub fn extract_blocks(document: &Html) -> StructuredBlocks {
    let mut blocks = StructuredBlocks::default();

    for script in document.select(&SCRIPT) {
        let Some(kind) = script.value().attr("type") else {
            continue;
        };
        let kind = kind.trim().to_ascii_lowercase();
        let target = match kind.as_str() {
            LD_JSON => &mut blocks.ld_json,
            PLAIN_JSON => &mut blocks.plain_json,
            _ => continue,
        };

        let raw = script.text().collect::<String>();
        if raw.trim().is_empty() {
            continue;
        }
        match decode_block(&raw) {
            Ok(Value::Array(items)) => {
                target.extend(items);
                blocks.found += 1;
            }
            Ok(value) => {
                target.push(value);
                blocks.found += 1;
            }
            Err(e) => warn!(script_type = %kind, error = %e, "Skipping undecodable JSON block"),
        }
    }

    debug!(
        ld_json = blocks.ld_json.len(),
        plain_json = blocks.plain_json.len(),
        found = blocks.found,
        "Extracted structured blocks"
    );
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_both_kinds_in_order() {
        let html = Html::parse_document(
            r#"<html><head>
            <script type="application/ld+json">{"@type": "NewsArticle", "headline": "A"}</script>
            <script type="application/json">{"page": 1}</script>
            <script type="application/ld+json">{"@type": "WebPage"}</script>
            <script>var x = 1;</script>
            </head><body></body></html>"#,
        );
        let blocks = extract_blocks(&html);
        assert_eq!(blocks.ld_json.len(), 2);
        assert_eq!(blocks.ld_json[0]["headline"], json!("A"));
        assert_eq!(blocks.ld_json[1]["@type"], json!("WebPage"));
        assert_eq!(blocks.plain_json, vec![json!({"page": 1})]);
    }

    #[test]
    fn test_control_whitespace_inside_strings_is_stripped() {
        let html = Html::parse_document(
            "<script type=\"application/ld+json\">{\"articleBody\": \"line one\nline two\"}</script>",
        );
        let blocks = extract_blocks(&html);
        assert_eq!(blocks.ld_json[0]["articleBody"], json!("line oneline two"));
    }

    #[test]
    fn test_bad_block_is_dropped_not_fatal() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">{"@type": "NewsArticle",</script>
            <script type="application/ld+json">{"@type": "Organization"}</script>"#,
        );
        let blocks = extract_blocks(&html);
        assert_eq!(blocks.ld_json, vec![json!({"@type": "Organization"})]);
    }

    #[test]
    fn test_top_level_array_is_flattened() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">[{"@type": "NewsArticle"}, {"@type": "BreadcrumbList"}]</script>"#,
        );
        assert_eq!(extract_blocks(&html).ld_json.len(), 2);
    }

    #[test]
    fn test_empty_array_payload_still_counts_as_found() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">[]</script>
            <script type="application/ld+json">{"broken":</script>"#,
        );
        let blocks = extract_blocks(&html);
        assert!(blocks.ld_json.is_empty());
        assert_eq!(blocks.found, 1);
    }

    #[test]
    fn test_decode_block_reports_structured_error() {
        let err = decode_block("{nope").unwrap_err();
        assert!(matches!(err, ScrapeError::StructuredDataDecode { .. }));
    }

    #[test]
    fn test_type_attribute_case_insensitive() {
        let html = Html::parse_document(
            r#"<script type="Application/LD+JSON">{"@type": "NewsArticle"}</script>"#,
        );
        assert_eq!(extract_blocks(&html).ld_json.len(), 1);
    }
}
