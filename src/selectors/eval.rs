//! Strategy evaluation against one page.
//!
//! Every strategy returns a JSON value; "nothing found" is an empty value
//! (see [`crate::prune::is_empty`]), not an error. Errors are reserved for
//! broken configuration such as an invalid selector or regex, and callers
//! treat them as empty for that strategy only.

use super::Strategy;
use super::xpath::{self, XPathError, XPathTarget};
use crate::models::ClassifiedJsonLd;
use crate::prune::is_empty;
use crate::utils::normalize_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid css selector {0:?}")]
    InvalidSelector(String),
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error(transparent)]
    XPath(#[from] XPathError),
}

/// Compiled selectors shared across pages; invalid selectors are cached as `None`.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Get or compile a CSS selector, caching the result.
pub fn compiled(css: &str) -> Result<Selector, StrategyError> {
    if let Some(cached) = SELECTOR_CACHE.read().ok().and_then(|c| c.get(css).cloned()) {
        return cached.ok_or_else(|| StrategyError::InvalidSelector(css.to_string()));
    }
    let parsed = Selector::parse(css).ok();
    if let Ok(mut cache) = SELECTOR_CACHE.write() {
        cache.insert(css.to_string(), parsed.clone());
    }
    parsed.ok_or_else(|| StrategyError::InvalidSelector(css.to_string()))
}

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Get or compile a regex. Only valid patterns are cached.
pub fn compiled_regex(pattern: &str) -> Result<Regex, StrategyError> {
    if let Some(cached) = REGEX_CACHE.read().ok().and_then(|c| c.get(pattern).cloned()) {
        return Ok(cached);
    }
    let re = Regex::new(pattern)?;
    if let Ok(mut cache) = REGEX_CACHE.write() {
        cache.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

/// Everything a strategy may look at.
pub struct PageContext<'a> {
    pub url: &'a str,
    pub document: &'a Html,
    pub json: &'a ClassifiedJsonLd,
}

impl<'a> PageContext<'a> {
    pub fn new(url: &'a str, document: &'a Html, json: &'a ClassifiedJsonLd) -> Self {
        Self {
            url,
            document,
            json,
        }
    }

    /// Run strategies in order and keep the first non-empty result.
    ///
    /// Returns `Value::Null` when all strategies come up empty. Strategy
    /// errors are logged and skipped.
    pub fn first_non_empty(&self, field: &str, strategies: &[Strategy]) -> Value {
        self.first_usable(field, strategies, |value| (!is_empty(&value)).then_some(value))
            .unwrap_or(Value::Null)
    }

    /// Run strategies in order, passing each non-empty result through
    /// `usable`, and keep the first one it accepts.
    ///
    /// A strategy whose raw value is present but unusable for the field (an
    /// author node without a name) falls through to the next strategy.
    pub fn first_usable<T>(
        &self,
        field: &str,
        strategies: &[Strategy],
        usable: impl Fn(Value) -> Option<T>,
    ) -> Option<T> {
        for strategy in strategies {
            match self.eval(strategy) {
                Ok(value) if is_empty(&value) => {}
                Ok(value) => match usable(value) {
                    Some(found) => return Some(found),
                    None => tracing::debug!(field, "Strategy value unusable; trying next"),
                },
                Err(e) => tracing::debug!(field, error = %e, "Strategy failed; treating as empty"),
            }
        }
        None
    }

    /// Evaluate a single strategy. An empty value means nothing matched.
    pub fn eval(&self, strategy: &Strategy) -> Result<Value, StrategyError> {
        match strategy {
            Strategy::MainJson { path } => Ok(self
                .json
                .main
                .as_ref()
                .and_then(|main| lookup(main, path))
                .cloned()
                .unwrap_or(Value::Null)),
            Strategy::VideoJson { path } => Ok(self
                .json
                .video_objects
                .first()
                .and_then(|video| lookup(video, path))
                .cloned()
                .unwrap_or(Value::Null)),
            Strategy::CssText { selector } => {
                let sel = compiled(selector)?;
                Ok(self
                    .document
                    .select(&sel)
                    .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
                    .find(|t| !t.is_empty())
                    .map(Value::String)
                    .unwrap_or(Value::Null))
            }
            Strategy::CssAttr { selector, attr } => {
                let sel = compiled(selector)?;
                Ok(self
                    .document
                    .select(&sel)
                    .filter_map(|el| el.value().attr(attr))
                    .map(str::trim)
                    .find(|v| !v.is_empty())
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null))
            }
            Strategy::CssAllText { selector } => {
                let sel = compiled(selector)?;
                Ok(Value::Array(
                    self.document
                        .select(&sel)
                        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
                        .filter(|t| !t.is_empty())
                        .map(Value::String)
                        .collect(),
                ))
            }
            Strategy::Xpath { expr, namespaces } => {
                let query = xpath::compile(expr, namespaces)?;
                let sel = compiled(&query.css)?;
                let values = self
                    .document
                    .select(&sel)
                    .filter_map(|el| read_target(el, &query.target))
                    .filter(|s| !s.is_empty())
                    .map(Value::String)
                    .collect::<Vec<_>>();
                Ok(match values.len() {
                    0 => Value::Null,
                    1 => values.into_iter().next().unwrap_or(Value::Null),
                    _ => Value::Array(values),
                })
            }
            Strategy::RegexStrip { pattern, input } => {
                let re = compiled_regex(pattern)?;
                Ok(map_strings(self.eval(input)?, &|s| {
                    re.replace_all(s, "").trim().to_string()
                }))
            }
            Strategy::JoinText { parts, sep } => {
                let mut pieces = Vec::new();
                for part in parts {
                    collect_strings(&self.eval(part)?, &mut pieces);
                }
                Ok(Value::String(
                    pieces
                        .into_iter()
                        .filter(|p| !p.is_empty())
                        .collect::<Vec<_>>()
                        .join(sep),
                ))
            }
            Strategy::FirstOf { strategies } => Ok(self.first_non_empty("first_of", strategies)),
            Strategy::ListOf { strategy } => Ok(match self.eval(strategy)? {
                Value::Array(items) => Value::Array(items),
                v if is_empty(&v) => Value::Null,
                v => Value::Array(vec![v]),
            }),
            Strategy::Constant { value } => Ok(value.clone()),
        }
    }
}

/// Follow a dotted path. Numeric segments index arrays; a named segment
/// applied to an array descends into its first element.
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(i) => items.get(i)?,
                Err(_) => items.first()?.get(segment)?,
            },
            _ => return None,
        };
    }
    Some(current)
}

fn read_target(el: ElementRef<'_>, target: &XPathTarget) -> Option<String> {
    match target {
        XPathTarget::Attr(name) => el.value().attr(name).map(|v| v.trim().to_string()),
        XPathTarget::StringValue | XPathTarget::DescendantText => Some(normalize_whitespace(
            &el.text().collect::<Vec<_>>().join(" "),
        )),
        XPathTarget::OwnText => {
            let own = el
                .children()
                .filter_map(|child| match child.value() {
                    Node::Text(t) => Some(t.trim().to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            Some(normalize_whitespace(&own))
        }
    }
}

fn map_strings(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_strings(v, f)).collect()),
        other => other,
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.trim().to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    const PAGE: &str = r#"
        <html lang="en"><head>
          <title>Storm hits coast | Daily Example</title>
          <meta property="og:title" content="  Storm hits coast ">
        </head><body>
          <h1>Storm <b>hits</b>   coast</h1>
          <p class="byline">By <span class="first">Jane</span> <span class="last">Roe</span></p>
          <ul class="tags"><li>weather</li><li></li><li>coast</li></ul>
        </body></html>
    "#;

    fn with_ctx<T>(json: ClassifiedJsonLd, f: impl FnOnce(&PageContext<'_>) -> T) -> T {
        let doc = Html::parse_document(PAGE);
        let ctx = PageContext::new("https://daily.example/storm", &doc, &json);
        f(&ctx)
    }

    #[test]
    fn test_main_json_path() {
        let json = ClassifiedJsonLd {
            main: Some(json!({
                "publisher": {"logo": {"url": "l.png"}},
                "image": [{"url": "a.jpg"}]
            })),
            ..Default::default()
        };
        with_ctx(json, |ctx| {
            assert_eq!(
                ctx.eval(&Strategy::main_json("publisher.logo.url")).unwrap(),
                json!("l.png")
            );
            assert_eq!(ctx.eval(&Strategy::main_json("image.url")).unwrap(), json!("a.jpg"));
            assert_eq!(ctx.eval(&Strategy::main_json("image.0.url")).unwrap(), json!("a.jpg"));
            assert_eq!(ctx.eval(&Strategy::main_json("missing")).unwrap(), Value::Null);
        });
    }

    #[test]
    fn test_main_json_without_main_is_empty() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            assert_eq!(ctx.eval(&Strategy::main_json("headline")).unwrap(), Value::Null);
        });
    }

    #[test]
    fn test_video_json_uses_first_video() {
        let json = ClassifiedJsonLd {
            video_objects: vec![json!({"embedUrl": "v1"}), json!({"embedUrl": "v2"})],
            ..Default::default()
        };
        with_ctx(json, |ctx| {
            assert_eq!(ctx.eval(&Strategy::video_json("embedUrl")).unwrap(), json!("v1"));
        });
    }

    #[test]
    fn test_css_strategies() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            assert_eq!(ctx.eval(&Strategy::css_text("h1")).unwrap(), json!("Storm hits coast"));
            assert_eq!(
                ctx.eval(&Strategy::css_attr("meta[property='og:title']", "content")).unwrap(),
                json!("Storm hits coast")
            );
            assert_eq!(
                ctx.eval(&Strategy::CssAllText { selector: "ul.tags li".into() }).unwrap(),
                json!(["weather", "coast"])
            );
        });
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            assert!(matches!(
                ctx.eval(&Strategy::css_text("[[[invalid")),
                Err(StrategyError::InvalidSelector(_))
            ));
            // and the field-level loop treats it as a miss
            assert_eq!(
                ctx.first_non_empty(
                    "title",
                    &[Strategy::css_text("[[[invalid"), Strategy::css_text("h1")]
                ),
                json!("Storm hits coast")
            );
        });
    }

    #[test]
    fn test_regex_strip_and_join() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            let strip = Strategy::RegexStrip {
                pattern: r"\s*\|.*$".into(),
                input: Box::new(Strategy::css_text("title")),
            };
            assert_eq!(ctx.eval(&strip).unwrap(), json!("Storm hits coast"));

            let join = Strategy::JoinText {
                parts: vec![Strategy::css_text("span.first"), Strategy::css_text("span.last")],
                sep: " ".into(),
            };
            assert_eq!(ctx.eval(&join).unwrap(), json!("Jane Roe"));
        });
    }

    #[test]
    fn test_xpath_strategy() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            let s = Strategy::Xpath {
                expr: "//p[@class='byline']/span".into(),
                namespaces: BTreeMap::new(),
            };
            assert_eq!(ctx.eval(&s).unwrap(), json!(["Jane", "Roe"]));
            let own = Strategy::Xpath {
                expr: "//h1/text()".into(),
                namespaces: BTreeMap::new(),
            };
            assert_eq!(ctx.eval(&own).unwrap(), json!("Storm coast"));
        });
    }

    #[test]
    fn test_first_of_list_of_constant() {
        with_ctx(ClassifiedJsonLd::default(), |ctx| {
            let s = Strategy::FirstOf {
                strategies: vec![
                    Strategy::css_text("h2"),
                    Strategy::Constant { value: json!("fallback") },
                ],
            };
            assert_eq!(ctx.eval(&s).unwrap(), json!("fallback"));
            let l = Strategy::ListOf {
                strategy: Box::new(Strategy::css_text("h1")),
            };
            assert_eq!(ctx.eval(&l).unwrap(), json!(["Storm hits coast"]));
        });
    }

    #[test]
    fn test_first_usable_skips_unusable_values() {
        let json = ClassifiedJsonLd {
            main: Some(json!({"author": {"@id": "https://daily.example/#/person/1"}})),
            ..Default::default()
        };
        with_ctx(json, |ctx| {
            let rules = [Strategy::main_json("author"), Strategy::css_text("h1")];
            let name = ctx.first_usable("author", &rules, |v| v.as_str().map(str::to_string));
            assert_eq!(name.as_deref(), Some("Storm hits coast"));
            assert_eq!(ctx.first_usable("author", &rules[..1], |v| v.as_str().map(str::len)), None);
        });
    }

    #[test]
    fn test_regex_cache_keeps_valid_patterns_only() {
        let a = compiled_regex(r"\s*\|.*$").unwrap();
        let b = compiled_regex(r"\s*\|.*$").unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert!(REGEX_CACHE.read().unwrap().contains_key(r"\s*\|.*$"));
        assert!(matches!(compiled_regex("(unclosed"), Err(StrategyError::InvalidRegex(_))));
        assert!(!REGEX_CACHE.read().unwrap().contains_key("(unclosed"));
    }

    #[test]
    fn test_selector_cache_reuses_compiled() {
        assert!(compiled("div.container").is_ok());
        assert!(compiled("div.container").is_ok());
        assert!(compiled("[[[bad").is_err());
        assert!(compiled("[[[bad").is_err());
    }
}
