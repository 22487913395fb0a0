//! Error taxonomy for a crawl.
//!
//! Per-document failures ([`ScrapeError::FetchFailed`],
//! [`ScrapeError::ArticleExtractionFailed`], [`ScrapeError::StructuredDataDecode`],
//! [`ScrapeError::DiscoveryFailed`]) are logged and the crawl moves on.
//! Crawl-wide failures ([`ScrapeError::InputValidation`], [`ScrapeError::Config`])
//! surface to the caller before anything is fetched.

use thiserror::Error;

/// All errors produced by this crate.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Malformed date range, missing URL, unknown query type.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Non-200 response or network failure for one URL. `status` is `None`
    /// when no response was received.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// An embedded JSON block could not be decoded.
    #[error("structured data decode failed: {reason}")]
    StructuredDataDecode { reason: String },

    /// The normalizer could not produce a minimally valid record.
    #[error("article extraction failed for {url}: {reason}")]
    ArticleExtractionFailed { url: String, reason: String },

    /// A discovery driver could not enumerate URLs from one source.
    #[error("discovery failed for {source_url}: {reason}")]
    DiscoveryFailed { source_url: String, reason: String },

    /// Site table or CLI configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Headless rendering was requested but could not be performed.
    #[error("rendering unavailable: {0}")]
    RenderUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Network-level failure: no usable response.
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        ScrapeError::FetchFailed {
            url: url.into(),
            status: None,
            reason: reason.to_string(),
        }
    }

    /// The server answered with something other than 200.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        ScrapeError::FetchFailed {
            url: url.into(),
            status: Some(status),
            reason: format!("expected 200 but got {status}"),
        }
    }

    pub fn extraction(url: impl Into<String>, reason: impl ToString) -> Self {
        ScrapeError::ArticleExtractionFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn discovery(source_url: impl Into<String>, reason: impl ToString) -> Self {
        ScrapeError::DiscoveryFailed {
            source_url: source_url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for fetch failures worth retrying: no response, 429 or 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::FetchFailed { status: None, .. } => true,
            ScrapeError::FetchFailed {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Returns true when the whole crawl must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::InputValidation(_) | ScrapeError::Config(_)
        )
    }
}
