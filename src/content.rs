//! DOM recipes for the article body and its figures.
//!
//! Body text: for every element matched by the recipe's selectors, walk the
//! subtree in document order, skipping `<script>`/`<style>` elements and any
//! element carrying one of the pruned classes, and join the text nodes with
//! single spaces.
//!
//! Images: one entry per matched block, the link taken from the first `img`
//! inside it and the caption from the caption selector. Entries without a
//! link are skipped; duplicates by link keep their first occurrence.

use crate::selectors::eval::{StrategyError, compiled};
use crate::selectors::{ContentRecipe, ImageRecipe};
use crate::utils::{normalize_whitespace, resolve_url};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;

static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

const SKIPPED_TAGS: [&str; 2] = ["script", "style"];

/// An image with its optional caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

fn is_pruned(el: ElementRef<'_>, prune_classes: &[String]) -> bool {
    let value = el.value();
    SKIPPED_TAGS.contains(&value.name())
        || value.classes().any(|c| prune_classes.iter().any(|p| p == c))
}

fn inside_pruned(el: ElementRef<'_>, prune_classes: &[String]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_pruned(a, prune_classes))
}

fn walk(el: ElementRef<'_>, prune_classes: &[String], out: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    out.push(t.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_pruned(child_el, prune_classes) {
                        walk(child_el, prune_classes, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Collect the body text described by `recipe`. Returns an empty string when
/// the recipe has no selectors or nothing matched.
pub fn body_text(document: &Html, recipe: &ContentRecipe) -> Result<String, StrategyError> {
    let mut pieces = Vec::new();
    for css in &recipe.selectors {
        let sel = compiled(css)?;
        for el in document.select(&sel) {
            if !is_pruned(el, &recipe.prune_classes) && !inside_pruned(el, &recipe.prune_classes) {
                walk(el, &recipe.prune_classes, &mut pieces);
            }
        }
    }
    Ok(normalize_whitespace(&pieces.join(" ")))
}

/// Collect figure images, resolved against `base_url`, de-duplicated by link.
pub fn images(
    document: &Html,
    recipe: &ImageRecipe,
    base_url: &str,
) -> Result<Vec<ImageEntry>, StrategyError> {
    let block_sel = compiled(&recipe.block)?;
    let caption_sel = compiled(&recipe.caption)?;

    let entries = document
        .select(&block_sel)
        .filter_map(|block| {
            let img = block.select(&IMG).next()?;
            let link = recipe
                .link_attrs
                .iter()
                .filter_map(|attr| img.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())?;
            let caption = block
                .select(&caption_sel)
                .next()
                .map(|c| normalize_whitespace(&c.text().collect::<Vec<_>>().join(" ")))
                .filter(|c| !c.is_empty());
            Some(ImageEntry {
                link: resolve_url(base_url, link),
                caption,
            })
        })
        .unique_by(|entry| entry.link.clone())
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ARTICLE: &str = r#"
        <html><body>
          <div class="article-body">
            <p>First paragraph with <a href="/x">a link</a>.</p>
            <div class="share-bar">Share on social<p>Also shared</p></div>
            <script>window.ads = [];</script>
            <figure>
              <img src="/img/one.jpg">
              <figcaption class="caption">Caption   one</figcaption>
            </figure>
            <p>Second
               paragraph.</p>
          </div>
          <figure><img data-src="https://cdn.example/two.jpg"></figure>
          <figure><img src="/img/one.jpg"><figcaption>Duplicate</figcaption></figure>
          <figure><figcaption>No image here</figcaption></figure>
        </body></html>
    "#;

    #[test]
    fn test_body_text_prunes_classes_and_scripts() {
        let doc = Html::parse_document(ARTICLE);
        let recipe = ContentRecipe {
            selectors: vec!["div.article-body p".into()],
            prune_classes: vec!["share-bar".into()],
        };
        // the nested <p> inside the share bar is matched but dropped
        assert_eq!(
            body_text(&doc, &recipe).unwrap(),
            "First paragraph with a link . Second paragraph."
        );
    }

    #[test]
    fn test_body_text_on_container_drops_pruned_subtrees() {
        let doc = Html::parse_document(ARTICLE);
        let recipe = ContentRecipe {
            selectors: vec!["div.article-body".into()],
            prune_classes: vec!["share-bar".into(), "caption".into()],
        };
        let text = body_text(&doc, &recipe).unwrap();
        assert!(!text.contains("Share on social"));
        assert!(!text.contains("window.ads"));
        assert!(!text.contains("Caption"));
        assert!(text.starts_with("First paragraph"));
        assert!(text.ends_with("Second paragraph."));
    }

    #[test]
    fn test_body_text_without_selectors_is_empty() {
        let doc = Html::parse_document(ARTICLE);
        assert_eq!(body_text(&doc, &ContentRecipe::default()).unwrap(), "");
    }

    #[test]
    fn test_images_dedup_skip_and_resolve() {
        let doc = Html::parse_document(ARTICLE);
        let found = images(&doc, &ImageRecipe::default(), "https://news.example/a/b").unwrap();
        assert_eq!(
            found,
            vec![
                ImageEntry {
                    link: "https://news.example/img/one.jpg".into(),
                    caption: Some("Caption one".into()),
                },
                ImageEntry {
                    link: "https://cdn.example/two.jpg".into(),
                    caption: None,
                },
            ]
        );
    }
}
