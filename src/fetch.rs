//! HTTP fetching with exponential backoff retry logic.
//!
//! - [`Fetch`]: async page/byte retrieval, the seam discovery and the crawler use
//! - [`HttpFetcher`]: reqwest-backed implementation with timeout and proxy
//! - [`RetryFetch`]: decorator adding retries to any [`Fetch`] implementation
//! - [`Render`]: headless rendering capability for script-heavy pages
//!
//! Only 200 responses count as success. Transport errors, 429 and 5xx are
//! retried; any other status fails immediately.
//!
//! # Backoff
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::error::ScrapeError;
use crate::models::FetchedDocument;
use crate::query::ProxyConfig;
use crate::sites::RenderRule;
use rand::{Rng, rng};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE, redirect::Policy};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

pub const DEFAULT_USER_AGENT: &str = concat!("newsld/", env!("CARGO_PKG_VERSION"));

/// Async retrieval of pages and raw bodies.
pub trait Fetch {
    /// GET `url` and decode the body as text.
    async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError>;

    /// GET `url` and return the undecoded body (sitemaps, feeds).
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError>;
}

impl<T: Fetch> Fetch for &T {
    async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError> {
        (**self).get_text(url).await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        (**self).get_bytes(url).await
    }
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Per-request timeout.
    pub timeout: StdDuration,
    pub user_agent: String,
    pub proxy: Option<ProxyConfig>,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout: StdDuration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

/// [`Fetch`] over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(options: &FetcherOptions) -> Result<Self, ScrapeError> {
        let mut builder = Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout)
            .redirect(Policy::limited(10))
            .gzip(true);

        if let Some(proxy) = &options.proxy {
            let mut p = reqwest::Proxy::all(proxy.url())
                .map_err(|e| ScrapeError::Config(format!("invalid proxy {}: {e}", proxy.url())))?;
            if let Some((user, pass)) = proxy.credentials() {
                p = p.basic_auth(user, pass);
            }
            builder = builder.proxy(p);
        }

        let client = builder
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::network(url, e))?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ScrapeError::status(url, status.as_u16()));
        }
        Ok(resp)
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError> {
        let resp = self.get_ok(url).await?;
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.text().await.map_err(|e| ScrapeError::network(url, e))?;
        debug!(bytes = body.len(), %content_type, "Fetched page");
        Ok(FetchedDocument::new(final_url, content_type, body))
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let resp = self.get_ok(url).await?;
        let body = resp.bytes().await.map_err(|e| ScrapeError::network(url, e))?;
        Ok(body.to_vec())
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
    max_jitter: StdDuration,
}

impl<T: Fetch> RetryFetch<T> {
    /// Wrap `inner`; `max_retries` counts attempts after the first.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.max_jitter.as_millis() as u64);
        delay + StdDuration::from_millis(jitter_ms)
    }

    async fn retrying<'s, R, Fut>(
        &'s self,
        url: &str,
        op: &'static str,
        call: impl Fn(&'s T) -> Fut,
    ) -> Result<R, ScrapeError>
    where
        Fut: Future<Output = Result<R, ScrapeError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match call(&self.inner).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        error!(
                            url,
                            op,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "Fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        url,
                        op,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError> {
        self.retrying(url, "get_text", |inner| inner.get_text(url)).await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        self.retrying(url, "get_bytes", |inner| inner.get_bytes(url)).await
    }
}

/// Headless rendering: return the page HTML once `rule.wait_for` matches.
///
/// Callers bound the call with [`RenderRule::timeout`].
pub trait Render {
    async fn render(&self, url: &str, rule: &RenderRule) -> Result<String, ScrapeError>;
}

/// Renderer used when no headless browser is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRender;

impl Render for NoRender {
    async fn render(&self, url: &str, _rule: &RenderRule) -> Result<String, ScrapeError> {
        Err(ScrapeError::RenderUnavailable(format!(
            "no headless renderer configured for {url}"
        )))
    }
}

/// In-memory fetcher for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Canned {
        Html(String),
        Bytes(Vec<u8>),
        Status(u16),
    }

    /// Serves canned responses; unknown URLs answer 404. Counts calls per URL.
    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, Canned>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn html(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Canned::Html(body.to_string()));
            self
        }

        pub fn bytes(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.pages.insert(url.to_string(), Canned::Bytes(body.into()));
            self
        }

        pub fn status(mut self, url: &str, code: u16) -> Self {
            self.pages.insert(url.to_string(), Canned::Status(code));
            self
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls
                .lock()
                .map(|c| c.get(url).copied().unwrap_or(0))
                .unwrap_or(0)
        }

        fn lookup(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls.entry(url.to_string()).or_default() += 1;
            }
            match self.pages.get(url) {
                Some(Canned::Html(body)) => Ok(body.clone().into_bytes()),
                Some(Canned::Bytes(body)) => Ok(body.clone()),
                Some(Canned::Status(code)) => Err(ScrapeError::status(url, *code)),
                None => Err(ScrapeError::status(url, 404)),
            }
        }
    }

    impl Fetch for StaticFetcher {
        async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError> {
            let body = self.lookup(url)?;
            Ok(FetchedDocument::new(
                url,
                "text/html; charset=utf-8",
                String::from_utf8_lossy(&body).into_owned(),
            ))
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
            self.lookup(url)
        }
    }

    /// Fails with `status` for the first `failures` calls, then serves `body`.
    #[derive(Debug)]
    pub struct FlakyFetcher {
        pub failures: Mutex<usize>,
        pub status: Option<u16>,
        pub body: String,
    }

    impl FlakyFetcher {
        pub fn new(failures: usize, status: Option<u16>) -> Self {
            Self {
                failures: Mutex::new(failures),
                status,
                body: "<html><body>ok</body></html>".to_string(),
            }
        }

        fn attempt(&self, url: &str) -> Result<(), ScrapeError> {
            let mut left = self.failures.lock().map_err(|e| ScrapeError::network(url, e))?;
            if *left == 0 {
                return Ok(());
            }
            *left -= 1;
            Err(match self.status {
                Some(code) => ScrapeError::status(url, code),
                None => ScrapeError::network(url, "connection reset"),
            })
        }
    }

    impl Fetch for FlakyFetcher {
        async fn get_text(&self, url: &str) -> Result<FetchedDocument, ScrapeError> {
            self.attempt(url)?;
            Ok(FetchedDocument::new(url, "text/html", self.body.clone()))
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
            self.attempt(url)?;
            Ok(self.body.clone().into_bytes())
        }
    }
}
