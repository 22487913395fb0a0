//! Sitemap driver.
//!
//! Reads `<sitemapindex>` and `<urlset>` documents in the sitemaps.org
//! namespace, with optional Google News extensions:
//!
//! ```xml
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
//!         xmlns:news="http://www.google.com/schemas/sitemap-news/0.9">
//!   <url>
//!     <loc>https://news.example/2024/05/20/storm</loc>
//!     <lastmod>2024-05-20T03:14:00Z</lastmod>
//!     <news:news>
//!       <news:publication_date>2024-05-20T03:00:00Z</news:publication_date>
//!       <news:title>Storm hits coast</news:title>
//!     </news:news>
//!   </url>
//! </urlset>
//! ```
//!
//! Elements from other namespaces (`image:loc`, `video:*`) are ignored.
//! Bodies starting with the gzip magic bytes are decompressed first.

use super::{Discover, within};
use crate::dates::{DateFilter, parse_day};
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::DiscoveredLink;
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use quick_xml::NsReader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::io::Read;
use tracing::{debug, info, instrument, warn};

pub const SITEMAP_NS: &[u8] = b"http://www.sitemaps.org/schemas/sitemap/0.9";
pub const NEWS_NS: &[u8] = b"http://www.google.com/schemas/sitemap-news/0.9";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn default_max_depth() -> usize {
    2
}

/// Site-table settings for the sitemap driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapConfig {
    /// Root sitemap or sitemap index.
    pub url: String,
    /// How many levels of nested indexes to follow below the root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Only follow child sitemaps whose URL matches.
    #[serde(default)]
    pub child_pattern: Option<String>,
}

/// One `<url>` or `<sitemap>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub news_title: Option<String>,
    pub news_publication_date: Option<String>,
}

impl SitemapEntry {
    /// Publication day: `news:publication_date` first, then `lastmod`.
    pub fn day(&self) -> Option<NaiveDate> {
        self.news_publication_date
            .as_deref()
            .and_then(parse_day)
            .or_else(|| self.lastmod.as_deref().and_then(parse_day))
    }

    fn into_link(self) -> DiscoveredLink {
        let published = self.day();
        DiscoveredLink {
            url: self.loc,
            title: self.news_title,
            published,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDoc {
    /// `<sitemapindex>`: entries point at further sitemaps.
    Index(Vec<SitemapEntry>),
    /// `<urlset>`: entries point at pages.
    UrlSet(Vec<SitemapEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    Lastmod,
    NewsTitle,
    NewsPublicationDate,
}

/// Decompress `body` when it carries the gzip magic bytes.
pub fn gunzip_if_needed(body: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Ok(body);
    }
    let mut out = Vec::with_capacity(body.len() * 4);
    GzDecoder::new(body.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

fn is_sitemap_ns(ns: &ResolveResult<'_>) -> bool {
    // some publishers omit the default namespace declaration
    matches!(ns, ResolveResult::Unbound)
        || matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == SITEMAP_NS)
}

fn is_news_ns(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == NEWS_NS)
}

/// Parse one sitemap document.
pub fn parse_sitemap(source_url: &str, xml: &[u8]) -> Result<SitemapDoc, ScrapeError> {
    // text is trimmed per field, so spaces around entity references survive
    let mut reader = NsReader::from_reader(xml);

    let mut buf = Vec::new();
    let mut is_index: Option<bool> = None;
    let mut entries = Vec::new();
    let mut entry: Option<SitemapEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let (ns, event) = reader.read_resolved_event_into(&mut buf).map_err(|e| {
            ScrapeError::discovery(source_url, format!("malformed sitemap XML: {e}"))
        })?;
        match event {
            Event::Start(e) => {
                let local = e.local_name();
                if is_sitemap_ns(&ns) {
                    match local.as_ref() {
                        b"sitemapindex" => is_index = Some(true),
                        b"urlset" => is_index = Some(false),
                        b"sitemap" | b"url" => entry = Some(SitemapEntry::default()),
                        b"loc" => field = Some(Field::Loc),
                        b"lastmod" => field = Some(Field::Lastmod),
                        _ => {}
                    }
                } else if is_news_ns(&ns) {
                    match local.as_ref() {
                        b"title" => field = Some(Field::NewsTitle),
                        b"publication_date" => field = Some(Field::NewsPublicationDate),
                        _ => {}
                    }
                }
                if field.is_some() {
                    text.clear();
                }
            }
            Event::Text(t) if field.is_some() => text.push_str(&String::from_utf8_lossy(&t)),
            Event::CData(t) if field.is_some() => text.push_str(&String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) if field.is_some() => {
                let name = String::from_utf8_lossy(&r).into_owned();
                match r.resolve_char_ref() {
                    Ok(Some(c)) => text.push(c),
                    _ => match resolve_predefined_entity(&name) {
                        Some(s) => text.push_str(s),
                        None => text.push_str(&format!("&{name};")),
                    },
                }
            }
            Event::End(e) => {
                if let (Some(f), Some(current)) = (field.take(), entry.as_mut()) {
                    let value = text.trim().to_string();
                    if !value.is_empty() {
                        match f {
                            Field::Loc => current.loc = value,
                            Field::Lastmod => current.lastmod = Some(value),
                            Field::NewsTitle => current.news_title = Some(value),
                            Field::NewsPublicationDate => {
                                current.news_publication_date = Some(value)
                            }
                        }
                    }
                    text.clear();
                }
                if is_sitemap_ns(&ns) && matches!(e.local_name().as_ref(), b"sitemap" | b"url") {
                    if let Some(done) = entry.take().filter(|d| !d.loc.is_empty()) {
                        entries.push(done);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match is_index {
        Some(true) => Ok(SitemapDoc::Index(entries)),
        Some(false) => Ok(SitemapDoc::UrlSet(entries)),
        None => Err(ScrapeError::discovery(
            source_url,
            "neither <urlset> nor <sitemapindex> found",
        )),
    }
}

impl SitemapConfig {
    fn child_filter(&self) -> Result<Option<Regex>, ScrapeError> {
        self.child_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ScrapeError::Config(format!("invalid child_pattern: {e}")))
    }

    async fn load<F: Fetch>(&self, fetcher: &F, url: &str) -> Result<SitemapDoc, ScrapeError> {
        let body = fetcher
            .get_bytes(url)
            .await
            .map_err(|e| ScrapeError::discovery(url, e))?;
        let xml = gunzip_if_needed(body)
            .map_err(|e| ScrapeError::discovery(url, format!("gzip decode failed: {e}")))?;
        parse_sitemap(url, &xml)
    }
}

impl Discover for SitemapConfig {
    /// Breadth-first walk from the root. A failing child sitemap is logged and
    /// skipped; a failing root is an error.
    #[instrument(level = "info", skip_all, fields(root = %self.url))]
    async fn discover<F: Fetch>(
        &self,
        fetcher: &F,
        filter: &DateFilter,
    ) -> Result<Vec<DiscoveredLink>, ScrapeError> {
        let child_filter = self.child_filter()?;
        let mut queue = VecDeque::from([(self.url.clone(), 0usize)]);
        let mut visited = HashSet::new();
        let mut links = Vec::new();

        while let Some((url, depth)) = queue.pop_front() {
            if !visited.insert(url.clone()) {
                continue;
            }
            let doc = match self.load(fetcher, &url).await {
                Ok(doc) => doc,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!(sitemap = %url, error = %e, "Skipping child sitemap");
                    continue;
                }
            };

            match doc {
                SitemapDoc::Index(children) => {
                    if depth >= self.max_depth {
                        debug!(sitemap = %url, depth, "Not descending past max_depth");
                        continue;
                    }
                    for child in children {
                        let stale = child.day().is_some_and(|d| d < filter.start());
                        let wanted = child_filter.as_ref().is_none_or(|re| re.is_match(&child.loc));
                        if wanted && !stale {
                            queue.push_back((child.loc, depth + 1));
                        }
                    }
                }
                SitemapDoc::UrlSet(entries) => {
                    let before = links.len();
                    links.extend(
                        entries
                            .into_iter()
                            .map(SitemapEntry::into_link)
                            .filter(|link| within(filter, link)),
                    );
                    debug!(sitemap = %url, kept = links.len() - before, "Read urlset");
                }
            }
        }

        info!(links = links.len(), sitemaps = visited.len(), "Sitemap walk finished");
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
        xmlns:news="http://www.google.com/schemas/sitemap-news/0.9"
        xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
  <url>
    <loc>https://news.example/storm?id=1&amp;ref=sm</loc>
    <lastmod>2024-05-20T03:14:00Z</lastmod>
    <image:image><image:loc>https://news.example/img.jpg</image:loc></image:image>
  </url>
  <url>
    <loc>https://news.example/late-night</loc>
    <lastmod>2024-05-19T23:59:00Z</lastmod>
  </url>
  <url>
    <loc>https://news.example/with-news</loc>
    <lastmod>2024-05-01</lastmod>
    <news:news>
      <news:publication_date>2024-05-20T01:00:00+01:00</news:publication_date>
      <news:title><![CDATA[Rates & markets]]></news:title>
    </news:news>
  </url>
  <url>
    <loc>https://news.example/undated</loc>
  </url>
</urlset>"#;

    fn today() -> DateFilter {
        DateFilter::Day(NaiveDate::from_ymd_opt(2024, 5, 20).unwrap())
    }

    fn gzip(data: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_parse_urlset_with_news_and_foreign_namespaces() {
        let SitemapDoc::UrlSet(entries) = parse_sitemap("s", URLSET.as_bytes()).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].loc, "https://news.example/storm?id=1&ref=sm");
        assert_eq!(entries[2].news_title.as_deref(), Some("Rates & markets"));
        assert_eq!(
            entries[2].day(),
            NaiveDate::from_ymd_opt(2024, 5, 20),
            "news date wins over lastmod"
        );
        assert_eq!(entries[3].day(), None);
    }

    #[test]
    fn test_parse_index_without_namespace() {
        let xml = "<sitemapindex><sitemap><loc>https://n.example/a.xml</loc></sitemap></sitemapindex>";
        let SitemapDoc::Index(children) = parse_sitemap("s", xml.as_bytes()).unwrap() else {
            panic!("expected index");
        };
        assert_eq!(children[0].loc, "https://n.example/a.xml");
    }

    #[test]
    fn test_non_sitemap_rejected() {
        assert!(parse_sitemap("s", b"<html><body/></html>").is_err());
        assert!(parse_sitemap("s", b"<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[test]
    fn test_gunzip_only_with_magic_bytes() {
        assert_eq!(gunzip_if_needed(b"<urlset/>".to_vec()).unwrap(), b"<urlset/>");
        assert_eq!(gunzip_if_needed(gzip("<urlset/>")).unwrap(), b"<urlset/>");
    }

    #[tokio::test]
    async fn test_day_only_run_keeps_todays_entries() {
        let fetcher = StaticFetcher::new().bytes("https://news.example/sitemap.xml", URLSET);
        let config = SitemapConfig {
            url: "https://news.example/sitemap.xml".into(),
            max_depth: 2,
            child_pattern: None,
        };
        let links = config.discover(&fetcher, &today()).await.unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example/storm?id=1&ref=sm",
                "https://news.example/with-news",
                "https://news.example/undated",
            ]
        );
        assert_eq!(links[1].title.as_deref(), Some("Rates & markets"));
        assert_eq!(links[2].published, None);
    }

    #[tokio::test]
    async fn test_index_walk_with_gzip_children_and_filters() {
        let index = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://news.example/news.xml.gz</loc><lastmod>2024-05-20</lastmod></sitemap>
  <sitemap><loc>https://news.example/old.xml</loc><lastmod>2023-01-01</lastmod></sitemap>
  <sitemap><loc>https://news.example/video.xml</loc></sitemap>
  <sitemap><loc>https://news.example/broken.xml</loc></sitemap>
</sitemapindex>"#;
        let fetcher = StaticFetcher::new()
            .bytes("https://news.example/index.xml", index)
            .bytes("https://news.example/news.xml.gz", gzip(URLSET))
            .bytes("https://news.example/old.xml", URLSET)
            .bytes("https://news.example/video.xml", URLSET);
        let config = SitemapConfig {
            url: "https://news.example/index.xml".into(),
            max_depth: 1,
            child_pattern: Some(r"/(news|old|broken)\.xml".into()),
        };
        let links = config.discover(&fetcher, &today()).await.unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(fetcher.calls("https://news.example/news.xml.gz"), 1);
        assert_eq!(fetcher.calls("https://news.example/old.xml"), 0, "stale child skipped");
        assert_eq!(fetcher.calls("https://news.example/video.xml"), 0, "pattern excluded");
        assert_eq!(
            fetcher.calls("https://news.example/broken.xml"),
            1,
            "404 logged, walk continues"
        );
    }

    #[tokio::test]
    async fn test_root_failure_is_discovery_error() {
        let fetcher =
            StaticFetcher::new().bytes("https://news.example/sitemap.xml", "not xml at all");
        let config = SitemapConfig {
            url: "https://news.example/sitemap.xml".into(),
            max_depth: 2,
            child_pattern: None,
        };
        let err = config.discover(&fetcher, &today()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::DiscoveryFailed { .. }));
    }

    #[tokio::test]
    async fn test_max_depth_zero_does_not_descend() {
        let index = r#"<sitemapindex><sitemap><loc>https://news.example/a.xml</loc></sitemap></sitemapindex>"#;
        let fetcher = StaticFetcher::new()
            .bytes("https://news.example/index.xml", index)
            .bytes("https://news.example/a.xml", URLSET);
        let config = SitemapConfig {
            url: "https://news.example/index.xml".into(),
            max_depth: 0,
            child_pattern: None,
        };
        assert!(config.discover(&fetcher, &today()).await.unwrap().is_empty());
        assert_eq!(fetcher.calls("https://news.example/a.xml"), 0);
    }
}
