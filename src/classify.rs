//! JSON-LD classification.
//!
//! Partitions decoded `ld+json` blocks by `@type`:
//!
//! | `@type` contains | bucket |
//! |---|---|
//! | an article type, first one seen | `main` |
//! | an article type, after `main` is taken | `other` |
//! | `ImageObject` / `ImageGallery` | `imageObjects` |
//! | `VideoObject` | `videoObjects` |
//! | anything else | `other` |
//!
//! Plain `application/json` blocks pass through to `misc` unclassified.
//! A block without a top-level `@type` but with an `@graph` array is
//! classified, and stored, as its first graph node.

use crate::models::{ClassifiedJsonLd, StructuredBlock, StructuredBlocks};
use crate::utils::as_list;
use serde_json::Value;

/// `@type` values that mark a candidate main block.
pub const ARTICLE_TYPES: [&str; 4] = [
    "NewsArticle",
    "ReportageNewsArticle",
    "LiveBlogPosting",
    "Article",
];
pub const IMAGE_TYPES: [&str; 2] = ["ImageObject", "ImageGallery"];
pub const VIDEO_TYPE: &str = "VideoObject";

/// The `@type` set of a node: a string becomes one entry, a list is used as-is.
pub fn type_set(node: &Value) -> Vec<&str> {
    node.get("@type")
        .map(as_list)
        .unwrap_or_default()
        .into_iter()
        .filter_map(Value::as_str)
        .collect()
}

/// Replace a typeless `@graph` wrapper by its first node.
fn unwrap_graph(block: Value) -> Value {
    if block.get("@type").is_some() {
        return block;
    }
    match block {
        Value::Object(mut map) => match map.remove("@graph") {
            Some(Value::Array(mut nodes)) if !nodes.is_empty() => nodes.swap_remove(0),
            Some(graph) => {
                map.insert("@graph".to_string(), graph);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn intersects(types: &[&str], wanted: &[&str]) -> bool {
    types.iter().any(|t| wanted.contains(t))
}

/// Classify a stream of tagged blocks, preserving document order in every bucket.
pub fn classify<I>(blocks: I) -> ClassifiedJsonLd
where
    I: IntoIterator<Item = StructuredBlock>,
{
    let mut out = ClassifiedJsonLd::default();

    for block in blocks {
        let node = match block {
            StructuredBlock::PlainJson(value) => {
                out.misc.push(value);
                continue;
            }
            StructuredBlock::LdJson(value) => unwrap_graph(value),
        };

        let types = type_set(&node);
        if intersects(&types, &ARTICLE_TYPES) {
            // article types win over image and video types on the same node
            if out.main.is_none() {
                out.main = Some(node);
            } else {
                out.other.push(node);
            }
        } else if intersects(&types, &IMAGE_TYPES) {
            out.image_objects.push(node);
        } else if types.contains(&VIDEO_TYPE) {
            out.video_objects.push(node);
        } else {
            out.other.push(node);
        }
    }

    out
}

/// Convenience wrapper over [`classify`] for the extractor's output.
pub fn classify_blocks(blocks: StructuredBlocks) -> ClassifiedJsonLd {
    classify(blocks.into_blocks())
}
