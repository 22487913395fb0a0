//! # newsld
//!
//! Scrapes one news site per run: discovers article URLs for a date range,
//! fetches each page, and normalizes its JSON-LD and DOM into a uniform
//! record. Results land in timestamped JSON files.
//!
//! ```sh
//! newsld --site premiumtimes --since 2024-05-18 --until 2024-05-20 -o ./out
//! ```

use chrono::Local;
use clap::Parser;
use newsld::cli::Cli;
use newsld::crawl::Crawler;
use newsld::fetch::{FetcherOptions, HttpFetcher, RetryFetch};
use newsld::outputs::json;
use newsld::query::CrawlQuery;
use newsld::sites::SiteTable;
use newsld::utils::ensure_writable_dir;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(site = %args.site, query_type = %args.query_type, "Parsed CLI arguments");

    let query = args.query()?;

    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let table = match &args.sites_file {
        Some(path) => SiteTable::from_file(path).await?,
        None => SiteTable::builtin()?,
    };
    let site = table.get(&args.site)?;
    info!(site = %site.name, sites = table.len(), "Loaded site table");

    let options = FetcherOptions {
        timeout: Duration::from_secs(args.timeout_secs),
        proxy: args.proxy(),
        ..FetcherOptions::default()
    };
    let fetcher = RetryFetch::new(
        HttpFetcher::new(&options)?,
        args.retries,
        Duration::from_secs(1),
    );

    let outcome = Crawler::new(site, &fetcher)
        .with_concurrency(args.concurrency)
        .run(&query, Local::now().date_naive())
        .await?;

    let stamp = Local::now().naive_local();
    let output_dir = Path::new(&args.output_dir);
    if !matches!(query, CrawlQuery::Article { .. }) {
        json::write_links(&outcome.links, &site.name, output_dir, stamp).await?;
    }
    if !matches!(query, CrawlQuery::LinkFeed { .. }) {
        json::write_records(&outcome.records, &site.name, output_dir, stamp).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        records = outcome.records.len(),
        "Execution complete"
    );
    Ok(())
}
