//! Command-line interface definitions.
//!
//! Every flag can also come from the environment where an `env` name is given.

use crate::error::ScrapeError;
use crate::query::{CrawlQuery, ProxyConfig};
use clap::Parser;

/// Scrape one news site into normalized JSON records.
///
/// # Examples
///
/// ```sh
/// # Today's articles
/// newsld --site premiumtimes
///
/// # Links only, for a range
/// newsld --site ghanaweb --type link_feed --since 2024-05-01 --until 2024-05-03
///
/// # One article through a proxy
/// PROXY_IP=10.0.0.2 PROXY_PORT=3128 newsld --site dailynation --type article --link https://...
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Site name from the site table
    #[arg(short, long, env = "NEWSLD_SITE")]
    pub site: String,

    /// Query type: sitemap, link_feed or article
    #[arg(short = 't', long = "type", default_value = "sitemap")]
    pub query_type: String,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Last day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Article URL for `--type article`
    #[arg(short, long)]
    pub link: Option<String>,

    /// Directory receiving Links/ and Article/
    #[arg(short, long, default_value = ".")]
    pub output_dir: String,

    /// YAML site table replacing the built-in one
    #[arg(long, env = "NEWSLD_SITES_FILE")]
    pub sites_file: Option<String>,

    /// Article fetches in flight
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries for transient fetch failures
    #[arg(long, default_value_t = 3)]
    pub retries: usize,

    #[arg(long, env = "PROXY_IP")]
    pub proxy_ip: Option<String>,

    #[arg(long, env = "PROXY_PORT")]
    pub proxy_port: Option<u16>,

    #[arg(long, env = "PROXY_USERNAME")]
    pub proxy_username: Option<String>,

    #[arg(long, env = "PROXY_PASSWORD", hide_env_values = true)]
    pub proxy_password: Option<String>,
}

impl Cli {
    pub fn query(&self) -> Result<CrawlQuery, ScrapeError> {
        CrawlQuery::from_parts(
            &self.query_type,
            self.since.clone(),
            self.until.clone(),
            self.link.clone(),
        )
    }

    /// Proxy settings, when both address and port are given.
    pub fn proxy(&self) -> Option<ProxyConfig> {
        let (ip, port) = (self.proxy_ip.as_ref()?, self.proxy_port?);
        Some(ProxyConfig {
            proxy_ip: ip.clone(),
            proxy_port: port,
            proxy_username: self.proxy_username.clone(),
            proxy_password: self.proxy_password.clone(),
        })
    }
}
