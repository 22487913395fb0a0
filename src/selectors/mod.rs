//! Per-site selector maps.
//!
//! A selector map says, for each normalized field, which [`Strategy`] values
//! to try and in what order. The first strategy producing a non-empty value
//! wins. Fields a site does not mention fall back to JSON-LD-first defaults,
//! so most site entries only list what differs.
//!
//! ```yaml
//! fields:
//!   title:
//!     - { kind: main_json, path: headline }
//!     - { kind: css_text, selector: "h1.article-title" }
//! content:
//!   selectors: ["div.article-body p"]
//!   prune_classes: ["share-bar", "ad-box"]
//! ```

pub mod eval;
pub mod xpath;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One way of obtaining a value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Dotted path into the main JSON-LD block, e.g. `publisher.logo.url`.
    MainJson { path: String },
    /// Dotted path into the first `VideoObject` block.
    VideoJson { path: String },
    /// Normalized text of the first matching element.
    CssText { selector: String },
    /// Attribute of the first matching element that carries it.
    CssAttr { selector: String, attr: String },
    /// Normalized text of every matching element.
    CssAllText { selector: String },
    /// XPath expression (supported subset), optionally with namespace prefixes.
    Xpath {
        expr: String,
        #[serde(default)]
        namespaces: BTreeMap<String, String>,
    },
    /// Remove every match of `pattern` from the strings produced by `input`.
    RegexStrip {
        pattern: String,
        input: Box<Strategy>,
    },
    /// Concatenate the text produced by several strategies.
    JoinText {
        parts: Vec<Strategy>,
        #[serde(default = "default_separator")]
        sep: String,
    },
    /// First non-empty result among nested strategies.
    FirstOf { strategies: Vec<Strategy> },
    /// Force the result of a strategy into a list.
    ListOf { strategy: Box<Strategy> },
    /// A literal value.
    Constant { value: Value },
}

fn default_separator() -> String {
    " ".to_string()
}

/// Shorthands for the common strategies.
impl Strategy {
    /// Dotted path into the main article block.
    pub fn main_json(path: &str) -> Self {
        Strategy::MainJson {
            path: path.to_string(),
        }
    }

    /// Dotted path into the first `VideoObject`.
    pub fn video_json(path: &str) -> Self {
        Strategy::VideoJson {
            path: path.to_string(),
        }
    }

    /// Text of the first element matching `selector`.
    pub fn css_text(selector: &str) -> Self {
        Strategy::CssText {
            selector: selector.to_string(),
        }
    }

    /// Attribute `attr` of the first element matching `selector`.
    pub fn css_attr(selector: &str, attr: &str) -> Self {
        Strategy::CssAttr {
            selector: selector.to_string(),
            attr: attr.to_string(),
        }
    }
}

/// Field name to strategy list. Unlisted fields use the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default = "defaults::title")]
    pub title: Vec<Strategy>,
    #[serde(default = "defaults::description")]
    pub description: Vec<Strategy>,
    /// JSON-LD author first, then a byline selector.
    #[serde(default = "defaults::author")]
    pub author: Vec<Strategy>,
    #[serde(default = "defaults::published_at")]
    pub published_at: Vec<Strategy>,
    #[serde(default = "defaults::modified_at")]
    pub modified_at: Vec<Strategy>,
    #[serde(default = "defaults::publisher")]
    pub publisher: Vec<Strategy>,
    /// Used when the content recipe yields nothing.
    #[serde(default = "defaults::text")]
    pub text: Vec<Strategy>,
    #[serde(default = "defaults::section")]
    pub section: Vec<Strategy>,
    #[serde(default = "defaults::tags")]
    pub tags: Vec<Strategy>,
    #[serde(default = "defaults::thumbnail_image")]
    pub thumbnail_image: Vec<Strategy>,
    /// Video link; `videoObjects[0].embedUrl` is tried before these.
    #[serde(default)]
    pub video: Vec<Strategy>,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self {
            title: defaults::title(),
            description: defaults::description(),
            author: defaults::author(),
            published_at: defaults::published_at(),
            modified_at: defaults::modified_at(),
            publisher: defaults::publisher(),
            text: defaults::text(),
            section: defaults::section(),
            tags: defaults::tags(),
            thumbnail_image: defaults::thumbnail_image(),
            video: Vec::new(),
        }
    }
}

mod defaults {
    use super::Strategy;

    pub fn title() -> Vec<Strategy> {
        vec![
            Strategy::main_json("headline"),
            Strategy::css_attr("meta[property='og:title']", "content"),
            Strategy::css_text("h1"),
        ]
    }

    pub fn description() -> Vec<Strategy> {
        vec![
            Strategy::main_json("description"),
            Strategy::css_attr("meta[name='description']", "content"),
            Strategy::css_attr("meta[property='og:description']", "content"),
        ]
    }

    pub fn author() -> Vec<Strategy> {
        vec![
            Strategy::main_json("author"),
            Strategy::css_attr("meta[name='author']", "content"),
        ]
    }

    pub fn published_at() -> Vec<Strategy> {
        vec![
            Strategy::main_json("datePublished"),
            Strategy::css_attr("meta[property='article:published_time']", "content"),
            Strategy::css_attr("time[datetime]", "datetime"),
        ]
    }

    pub fn modified_at() -> Vec<Strategy> {
        vec![
            Strategy::main_json("dateModified"),
            Strategy::css_attr("meta[property='article:modified_time']", "content"),
        ]
    }

    pub fn publisher() -> Vec<Strategy> {
        vec![Strategy::main_json("publisher")]
    }

    pub fn text() -> Vec<Strategy> {
        vec![Strategy::main_json("articleBody")]
    }

    pub fn section() -> Vec<Strategy> {
        vec![
            Strategy::main_json("articleSection"),
            Strategy::css_attr("meta[property='article:section']", "content"),
        ]
    }

    pub fn tags() -> Vec<Strategy> {
        vec![
            Strategy::main_json("keywords"),
            Strategy::css_attr("meta[name='keywords']", "content"),
        ]
    }

    pub fn thumbnail_image() -> Vec<Strategy> {
        vec![
            Strategy::main_json("image.url"),
            Strategy::main_json("image"),
            Strategy::main_json("thumbnailUrl"),
            Strategy::css_attr("meta[property='og:image']", "content"),
        ]
    }
}

/// How to collect the article body from the DOM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRecipe {
    /// Selectors whose matches contribute text, in order.
    #[serde(default)]
    pub selectors: Vec<String>,
    /// Classes whose subtrees are dropped before text is collected.
    #[serde(default)]
    pub prune_classes: Vec<String>,
}

/// How to collect `(link, caption)` pairs from the DOM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecipe {
    /// One match per image entry.
    #[serde(default = "ImageRecipe::default_block")]
    pub block: String,
    /// Attributes of the first `img` inside a block, tried in order.
    #[serde(default = "ImageRecipe::default_attrs")]
    pub link_attrs: Vec<String>,
    #[serde(default = "ImageRecipe::default_caption")]
    pub caption: String,
}

impl ImageRecipe {
    fn default_block() -> String {
        "figure".to_string()
    }

    fn default_attrs() -> Vec<String> {
        vec!["src".to_string(), "data-src".to_string()]
    }

    fn default_caption() -> String {
        "figcaption".to_string()
    }
}

impl Default for ImageRecipe {
    fn default() -> Self {
        Self {
            block: Self::default_block(),
            link_attrs: Self::default_attrs(),
            caption: Self::default_caption(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_yaml_forms() {
        let yaml = r#"
- { kind: main_json, path: headline }
- { kind: css_attr, selector: "meta[property='og:title']", attr: content }
- kind: regex_strip
  pattern: "\\s*\\|.*$"
  input: { kind: css_text, selector: title }
- kind: join_text
  parts:
    - { kind: css_text, selector: "span.first" }
    - { kind: css_text, selector: "span.last" }
- { kind: xpath, expr: "//meta[@name='byl']/@content" }
- { kind: constant, value: "fixed" }
"#;
        let strategies: Vec<Strategy> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(strategies.len(), 6);
        assert_eq!(strategies[0], Strategy::main_json("headline"));
        match &strategies[3] {
            Strategy::JoinText { parts, sep } => {
                assert_eq!(parts.len(), 2);
                assert_eq!(sep, " ");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unlisted_fields_keep_defaults() {
        let rules: FieldRules =
            serde_yaml::from_str("title: [{ kind: css_text, selector: h2 }]").unwrap();
        assert_eq!(rules.title, vec![Strategy::css_text("h2")]);
        assert_eq!(rules.publisher, FieldRules::default().publisher);
        assert!(rules.video.is_empty());
    }

    #[test]
    fn test_image_recipe_defaults() {
        let recipe: ImageRecipe = serde_yaml::from_str("block: div.photo").unwrap();
        assert_eq!(recipe.block, "div.photo");
        assert_eq!(recipe.caption, "figcaption");
        assert_eq!(recipe.link_attrs, vec!["src", "data-src"]);
    }
}
