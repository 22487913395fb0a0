//! Field Normalizer: classified JSON-LD + DOM + site rules -> `parsed_data`.
//!
//! Every field is a list. Scalars become one-element lists, structured
//! fields (author, publisher, images, video) become lists of objects. Fields
//! whose strategies all come up empty are left out and reported as misses.

use crate::content;
use crate::prune::is_empty;
use crate::selectors::Strategy;
use crate::selectors::eval::PageContext;
use crate::sites::SiteConfig;
use crate::utils::{normalize_whitespace, resolve_url};
use serde_json::{Map, Value, json};
use tracing::debug;

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub data: Map<String, Value>,
    /// Rule-driven fields for which no strategy matched.
    pub misses: Vec<&'static str>,
}

impl Normalized {
    fn put(&mut self, field: &'static str, items: Vec<Value>) {
        if items.iter().all(is_empty) {
            debug!(field, "No strategy matched");
            self.misses.push(field);
        } else {
            self.put_optional(field, items);
        }
    }

    fn put_optional(&mut self, field: &'static str, items: Vec<Value>) {
        let items: Vec<Value> = items.into_iter().filter(|v| !is_empty(v)).collect();
        if !items.is_empty() {
            self.data.insert(field.to_string(), Value::Array(items));
        }
    }
}

/// A JSON-LD `author` is either one node or a list of nodes.
enum AuthorField<'v> {
    Single(&'v Value),
    Many(&'v [Value]),
}

impl<'v> AuthorField<'v> {
    fn from_value(value: &'v Value) -> Self {
        match value {
            Value::Array(items) => AuthorField::Many(items),
            other => AuthorField::Single(other),
        }
    }

    fn entries(&self) -> Vec<Value> {
        match self {
            AuthorField::Single(v) => author_entry(v).into_iter().collect(),
            AuthorField::Many(items) => items.iter().filter_map(author_entry).collect(),
        }
    }
}

fn author_entry(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let name = normalize_whitespace(s);
            (!name.is_empty()).then(|| json!({ "name": name }))
        }
        Value::Object(map) => {
            let name = map.get("name").and_then(first_string)?;
            let mut out = Map::new();
            if let Some(t) = map.get("@type").filter(|t| !is_empty(t)) {
                out.insert("@type".into(), t.clone());
            }
            out.insert("name".into(), Value::String(name));
            if let Some(url) = map.get("url").and_then(first_string) {
                out.insert("url".into(), Value::String(url));
            }
            Some(Value::Object(out))
        }
        _ => None,
    }
}

/// A publisher needs a name or a logo; a bare `@id` or `@type` is not enough.
fn publisher_entry(value: &Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.iter().find_map(publisher_entry),
        Value::String(s) => {
            let name = normalize_whitespace(s);
            (!name.is_empty()).then(|| json!({ "name": name }))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for key in ["@id", "@type", "name"] {
                if let Some(v) = map.get(key).filter(|v| !is_empty(v)) {
                    out.insert(key.into(), v.clone());
                }
            }
            if let Some(logo) = map.get("logo").and_then(logo_entry) {
                out.insert("logo".into(), logo);
            }
            (out.contains_key("name") || out.contains_key("logo")).then_some(Value::Object(out))
        }
        _ => None,
    }
}

fn logo_entry(value: &Value) -> Option<Value> {
    match value {
        Value::String(url) => Some(json!({ "url": url })),
        Value::Array(items) => items.iter().find_map(logo_entry),
        Value::Object(map) => {
            let mut out = Map::new();
            if let Some(url) = map.get("url").or_else(|| map.get("contentUrl")) {
                out.insert("url".into(), url.clone());
            }
            for key in ["width", "height"] {
                if let Some(v) = map.get(key) {
                    out.insert(key.into(), distance(v));
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
        _ => None,
    }
}

/// Numeric logo dimensions become `{"@type": "Distance", "name": "<N> px"}`.
fn distance(value: &Value) -> Value {
    let Value::Number(n) = value else {
        return value.clone();
    };
    let amount = match n.as_f64() {
        Some(f) if f.fract() == 0.0 && n.as_i64().is_none() && n.as_u64().is_none() => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    };
    json!({ "@type": "Distance", "name": format!("{amount} px") })
}

/// First usable string in a value: the string itself, a number, or the first
/// such item of a list.
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(normalize_whitespace(s)).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

fn all_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(all_strings).collect(),
        other => first_string(other).into_iter().collect(),
    }
}

/// Keywords as a list; comma-joined strings are split, inside lists too.
fn tags(value: &Value) -> Vec<String> {
    all_strings(value)
        .iter()
        .flat_map(|s| s.split(','))
        .map(normalize_whitespace)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Image URL from a string, an `ImageObject`-like node, or a list of either.
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(image_url),
        Value::Array(items) => items.iter().find_map(image_url),
        _ => None,
    }
}

fn strings(items: Vec<String>) -> Vec<Value> {
    items.into_iter().map(Value::String).collect()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    Some(items).filter(|i| !i.is_empty())
}

/// First strategy result that yields a string; the rest are fallbacks.
fn scalar(ctx: &PageContext<'_>, field: &'static str, rules: &[Strategy]) -> Vec<Value> {
    strings(ctx.first_usable(field, rules, |v| first_string(&v)).into_iter().collect())
}

fn body_text(ctx: &PageContext<'_>, site: &SiteConfig) -> Option<String> {
    match content::body_text(ctx.document, &site.content) {
        Ok(text) if !text.is_empty() => return Some(text),
        Ok(_) => {}
        Err(e) => debug!(error = %e, "Content recipe failed; treating as empty"),
    }
    ctx.first_usable("text", &site.fields.text, |v| {
        Some(normalize_whitespace(&all_strings(&v).join(" "))).filter(|t| !t.is_empty())
    })
}

fn video(ctx: &PageContext<'_>, site: &SiteConfig) -> Option<Value> {
    let rules: Vec<Strategy> = std::iter::once(Strategy::video_json("embedUrl"))
        .chain(site.fields.video.iter().cloned())
        .collect();
    let link = ctx.first_usable("video", &rules, |v| image_url(&v))?;
    let mut entry = Map::new();
    entry.insert("link".into(), Value::String(resolve_url(ctx.url, &link)));
    let caption = [Strategy::video_json("description")];
    if let Some(caption) = ctx.first_usable("video", &caption, |v| first_string(&v)) {
        entry.insert("caption".into(), Value::String(caption));
    }
    Some(Value::Object(entry))
}

/// Build `parsed_data` for one page, `time_scraped` excepted.
///
/// `title_hint` is a title already known from discovery, used only when no
/// title strategy matches.
pub fn normalize(ctx: &PageContext<'_>, site: &SiteConfig, title_hint: Option<&str>) -> Normalized {
    let rules = &site.fields;
    let mut out = Normalized::default();

    out.put_optional("source_country", strings(vec![site.source_country.clone()]));
    let lang = ctx.document.root_element().value().attr("lang");
    out.put_optional("source_language", strings(site.language_for(lang).into_iter().collect()));

    let author = ctx.first_usable("author", &rules.author, |v| {
        non_empty(AuthorField::from_value(&v).entries())
    });
    out.put("author", author.unwrap_or_default());

    out.put("description", scalar(ctx, "description", &rules.description));
    out.put("published_at", scalar(ctx, "published_at", &rules.published_at));
    out.put("modified_at", scalar(ctx, "modified_at", &rules.modified_at));

    let publisher = ctx.first_usable("publisher", &rules.publisher, |v| publisher_entry(&v));
    out.put("publisher", publisher.into_iter().collect());

    let mut title = scalar(ctx, "title", &rules.title);
    if title.is_empty() {
        if let Some(hint) = title_hint.map(normalize_whitespace).filter(|h| !h.is_empty()) {
            title.push(Value::String(hint));
        }
    }
    out.put("title", title);

    out.put("text", strings(body_text(ctx, site).into_iter().collect()));

    let section = ctx.first_usable("section", &rules.section, |v| non_empty(all_strings(&v)));
    out.put("section", strings(section.unwrap_or_default()));

    let keywords = ctx.first_usable("tags", &rules.tags, |v| non_empty(tags(&v)));
    out.put("tags", strings(keywords.unwrap_or_default()));

    let thumbnail = ctx
        .first_usable("thumbnail_image", &rules.thumbnail_image, |v| image_url(&v))
        .map(|link| resolve_url(ctx.url, &link));
    out.put("thumbnail_image", strings(thumbnail.into_iter().collect()));

    match content::images(ctx.document, &site.images, ctx.url) {
        Ok(found) => out.put_optional(
            "images",
            found
                .into_iter()
                .filter_map(|entry| serde_json::to_value(entry).ok())
                .collect(),
        ),
        Err(e) => debug!(error = %e, "Image recipe failed; treating as empty"),
    }

    out.put_optional("embed_video_link", video(ctx, site).into_iter().collect());
    out
}
