//! The programmatic invocation surface.
//!
//! A crawl is driven by a [`CrawlQuery`], which deserializes from the JSON
//! shapes `{"type": "sitemap"|"link_feed", "since"?, "until"?}` and
//! `{"type": "article", "link": "..."}`. Proxy settings travel separately in
//! a [`ProxyConfig`] and are only consumed by the HTTP layer.

use crate::dates::DateFilter;
use crate::error::ScrapeError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlQuery {
    /// Discover, then fetch and normalize every article.
    Sitemap {
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        until: Option<String>,
    },
    /// Discover only; emit the links.
    LinkFeed {
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        until: Option<String>,
    },
    /// Normalize a single article.
    Article { link: String },
}

/// A validated query, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPlan {
    Discover {
        filter: DateFilter,
        fetch_articles: bool,
    },
    Single {
        link: String,
    },
}

impl CrawlQuery {
    /// Build a query from loose parts, as the CLI provides them.
    pub fn from_parts(
        kind: &str,
        since: Option<String>,
        until: Option<String>,
        link: Option<String>,
    ) -> Result<Self, ScrapeError> {
        match kind {
            "sitemap" => Ok(CrawlQuery::Sitemap { since, until }),
            "link_feed" => Ok(CrawlQuery::LinkFeed { since, until }),
            "article" => link
                .map(|link| CrawlQuery::Article { link })
                .ok_or_else(|| {
                    ScrapeError::InputValidation("article queries require a link".to_string())
                }),
            other => Err(ScrapeError::InputValidation(format!(
                "unknown query type {other:?}"
            ))),
        }
    }

    /// Validate bounds and links before anything is fetched.
    pub fn plan(&self, today: NaiveDate) -> Result<CrawlPlan, ScrapeError> {
        match self {
            CrawlQuery::Sitemap { since, until } => Ok(CrawlPlan::Discover {
                filter: DateFilter::from_bounds(since.as_deref(), until.as_deref(), today)?,
                fetch_articles: true,
            }),
            CrawlQuery::LinkFeed { since, until } => Ok(CrawlPlan::Discover {
                filter: DateFilter::from_bounds(since.as_deref(), until.as_deref(), today)?,
                fetch_articles: false,
            }),
            CrawlQuery::Article { link } => {
                let parsed = Url::parse(link.trim()).map_err(|e| {
                    ScrapeError::InputValidation(format!("bad article link {link:?}: {e}"))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ScrapeError::InputValidation(format!(
                        "article link must be http(s): {link}"
                    )));
                }
                Ok(CrawlPlan::Single {
                    link: parsed.to_string(),
                })
            }
        }
    }
}

/// Outbound proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub proxy_ip: String,
    pub proxy_port: u16,
    #[serde(default)]
    pub proxy_username: Option<String>,
    #[serde(default)]
    pub proxy_password: Option<String>,
}

impl ProxyConfig {
    /// `http://<ip>:<port>`; credentials are applied separately.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.proxy_ip, self.proxy_port)
    }

    /// Credentials, when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.proxy_username, &self.proxy_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
    }

    #[test]
    fn test_deserialize_sitemap_query() {
        let json = r#"{"type": "sitemap", "since": "2024-05-01", "until": "2024-05-03"}"#;
        let q: CrawlQuery = serde_json::from_str(json).unwrap();
        assert_eq!(
            q,
            CrawlQuery::Sitemap {
                since: Some("2024-05-01".into()),
                until: Some("2024-05-03".into())
            }
        );
    }

    #[test]
    fn test_deserialize_article_query() {
        let json = r#"{"type": "article", "link": "https://news.example/a"}"#;
        let q: CrawlQuery = serde_json::from_str(json).unwrap();
        assert_eq!(
            q.plan(today()).unwrap(),
            CrawlPlan::Single {
                link: "https://news.example/a".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<CrawlQuery>(r#"{"type": "archive"}"#).is_err());
        let err = CrawlQuery::from_parts("archive", None, None, None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_article_without_link_rejected() {
        let err = CrawlQuery::from_parts("article", None, None, None).unwrap_err();
        assert!(matches!(err, ScrapeError::InputValidation(_)));
    }

    #[test]
    fn test_article_with_bad_link_rejected() {
        let q = CrawlQuery::Article {
            link: "ftp://news.example/a".into(),
        };
        assert!(q.plan(today()).is_err());
        let q = CrawlQuery::Article {
            link: "not a url".into(),
        };
        assert!(q.plan(today()).is_err());
    }

    #[test]
    fn test_link_feed_plans_discovery_only() {
        let q = CrawlQuery::from_parts("link_feed", None, None, None).unwrap();
        assert_eq!(
            q.plan(today()).unwrap(),
            CrawlPlan::Discover {
                filter: DateFilter::Day(today()),
                fetch_articles: false
            }
        );
    }

    #[test]
    fn test_proxy_config_camel_case() {
        let p: ProxyConfig = serde_json::from_str(
            r#"{"proxyIp": "10.0.0.1", "proxyPort": 3128, "proxyUsername": "u", "proxyPassword": "p"}"#,
        )
        .unwrap();
        assert_eq!(p.url(), "http://10.0.0.1:3128");
        assert_eq!(p.credentials(), Some(("u", "p")));
    }
}
