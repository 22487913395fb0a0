//! Data models for fetched pages, discovered links and normalized records.
//!
//! - [`FetchedDocument`]: one HTTP 200 response, consumed once by the pipeline
//! - [`DiscoveredLink`]: an article URL yielded by a discovery driver
//! - [`ClassifiedJsonLd`]: structured-data blocks partitioned by `@type`
//! - [`NormalizedRecord`]: the uniform per-article output
//!
//! `ClassifiedJsonLd` uses camelCase bucket names (`imageObjects`,
//! `videoObjects`) because downstream consumers read those keys verbatim.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page returned by the fetcher with status 200.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL of the page.
    pub url: String,
    pub http_status: u16,
    pub content_type: String,
    pub body_text: String,
}

impl FetchedDocument {
    pub fn new(
        url: impl Into<String>,
        content_type: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            http_status: 200,
            content_type: content_type.into(),
            body_text: body_text.into(),
        }
    }
}

/// An article URL produced by discovery, with whatever the index already told us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Publication day as reported by the index, when it reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
}

impl DiscoveredLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            published: None,
        }
    }
}

/// Decoded JSON blocks from one page, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredBlocks {
    /// `<script type="application/ld+json">` payloads.
    pub ld_json: Vec<Value>,
    /// `<script type="application/json">` payloads.
    pub plain_json: Vec<Value>,
    /// Script payloads that decoded, counted before arrays are flattened.
    /// An `[]` payload counts even though it adds no block.
    pub found: usize,
}

/// A single decoded block tagged by the script type it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredBlock {
    LdJson(Value),
    PlainJson(Value),
}

impl StructuredBlocks {
    /// Iterate all blocks in document order per kind, ld+json first.
    pub fn into_blocks(self) -> impl Iterator<Item = StructuredBlock> {
        self.ld_json
            .into_iter()
            .map(StructuredBlock::LdJson)
            .chain(self.plain_json.into_iter().map(StructuredBlock::PlainJson))
    }
}

/// JSON-LD blocks partitioned by kind.
///
/// Every `ld+json` block lands in exactly one of `main`, `image_objects`,
/// `video_objects` or `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedJsonLd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<Value>,
    #[serde(rename = "imageObjects", default)]
    pub image_objects: Vec<Value>,
    #[serde(rename = "videoObjects", default)]
    pub video_objects: Vec<Value>,
    #[serde(default)]
    pub other: Vec<Value>,
    #[serde(default)]
    pub misc: Vec<Value>,
}

impl ClassifiedJsonLd {
    /// Number of `ld+json` blocks held across the four classified buckets.
    pub fn ld_len(&self) -> usize {
        usize::from(self.main.is_some())
            + self.image_objects.len()
            + self.video_objects.len()
            + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ld_len() == 0 && self.misc.is_empty()
    }
}

/// Raw HTTP envelope kept alongside the parsed data.
///
/// Empty values are left out, so a response without a `Content-Type`
/// header serializes without the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl RawResponse {
    /// Envelope of `doc`; blank header or body become `None`.
    pub fn of(doc: &FetchedDocument) -> Self {
        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.trim().is_empty());
        Self {
            content_type: non_empty(&doc.content_type),
            content: non_empty(&doc.body_text),
        }
    }
}

/// The uniform output for one article.
///
/// `parsed_data` is always present; `parsed_json` only when the page carried
/// at least one structured block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub raw_response: RawResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_json: Option<Map<String, Value>>,
    pub parsed_data: Map<String, Value>,
}

impl NormalizedRecord {
    /// First string of a `parsed_data` field, if any.
    pub fn first_str(&self, field: &str) -> Option<&str> {
        self.parsed_data
            .get(field)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classified_serializes_camel_case_buckets() {
        let classified = ClassifiedJsonLd {
            main: Some(json!({"@type": "NewsArticle"})),
            image_objects: vec![json!({"@type": "ImageObject"})],
            ..Default::default()
        };
        let v = serde_json::to_value(&classified).unwrap();
        assert!(v.get("imageObjects").is_some());
        assert!(v.get("videoObjects").is_some());
        assert_eq!(classified.ld_len(), 2);
    }

    #[test]
    fn test_record_without_parsed_json_omits_key() {
        let record = NormalizedRecord {
            raw_response: RawResponse {
                content_type: Some("text/html".into()),
                content: Some("<html></html>".into()),
            },
            parsed_json: None,
            parsed_data: Map::new(),
        };
        let s = serde_json::to_string(&record).unwrap();
        assert!(!s.contains("parsed_json"));
        assert!(s.contains("parsed_data"));
    }

    #[test]
    fn test_raw_response_skips_blank_content_type() {
        let doc = FetchedDocument::new("https://news.example/a", "", "<html></html>");
        let raw = RawResponse::of(&doc);
        assert_eq!(raw.content_type, None);
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({"content": "<html></html>"})
        );
    }

    #[test]
    fn test_first_str() {
        let mut data = Map::new();
        data.insert("title".into(), json!(["Headline"]));
        let record = NormalizedRecord {
            raw_response: RawResponse::default(),
            parsed_json: None,
            parsed_data: data,
        };
        assert_eq!(record.first_str("title"), Some("Headline"));
        assert_eq!(record.first_str("text"), None);
    }

    #[test]
    fn test_discovered_link_serialization_skips_missing() {
        let link = DiscoveredLink::new("https://news.example/a");
        let s = serde_json::to_string(&link).unwrap();
        assert_eq!(s, r#"{"url":"https://news.example/a"}"#);
    }
}
