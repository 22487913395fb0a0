//! Date-range validation and day-granularity filtering.
//!
//! - No bounds: only articles published today (local date) pass.
//! - One bound without the other: rejected.
//! - Both bounds: rejected when `since > until` or when the range spans more
//!   than [`MAX_RANGE_DAYS`]; otherwise `since <= day <= until` passes.
//!
//! Time of day is discarded. A timestamp's day is the calendar day as
//! written, without converting its offset.

use crate::error::ScrapeError;
use chrono::{DateTime, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Longest accepted `since..until` span.
pub const MAX_RANGE_DAYS: i64 = 30;

static ISO_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4})-(\d{2})-(\d{2})").unwrap());

/// Parse a `YYYY-MM-DD` bound given on the command line or in a query.
pub fn parse_bound(s: &str) -> Result<NaiveDate, ScrapeError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ScrapeError::InputValidation(format!("bad date {s:?}: {e}")))
}

/// Extract the calendar day from a published/lastmod string.
///
/// Accepts anything starting with an ISO-8601 date, and RFC 2822 as used by RSS.
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DAY.captures(s) {
        let y = caps[1].parse().ok()?;
        let m = caps[2].parse().ok()?;
        let d = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|dt| dt.date_naive())
}

/// Which publication days a crawl accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// Only this day (the crawl's "today").
    Day(NaiveDate),
    /// Inclusive range.
    Range { since: NaiveDate, until: NaiveDate },
}

impl DateFilter {
    /// Build a filter from optional `since`/`until` bounds.
    pub fn from_bounds(
        since: Option<&str>,
        until: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, ScrapeError> {
        match (since, until) {
            (None, None) => Ok(DateFilter::Day(today)),
            (Some(_), None) | (None, Some(_)) => Err(ScrapeError::InputValidation(
                "since and until must be given together".to_string(),
            )),
            (Some(since), Some(until)) => {
                let since = parse_bound(since)?;
                let until = parse_bound(until)?;
                if since > until {
                    return Err(ScrapeError::InputValidation(format!(
                        "since {since} is after until {until}"
                    )));
                }
                if (until - since).num_days() > MAX_RANGE_DAYS {
                    return Err(ScrapeError::InputValidation(format!(
                        "range {since}..{until} exceeds {MAX_RANGE_DAYS} days"
                    )));
                }
                Ok(DateFilter::Range { since, until })
            }
        }
    }

    /// First accepted day.
    pub fn start(&self) -> NaiveDate {
        match *self {
            DateFilter::Day(day) => day,
            DateFilter::Range { since, .. } => since,
        }
    }

    /// Last accepted day, inclusive.
    pub fn end(&self) -> NaiveDate {
        match *self {
            DateFilter::Day(day) => day,
            DateFilter::Range { until, .. } => until,
        }
    }

    /// Whether `day` falls within `start()..=end()`.
    pub fn accepts(&self, day: NaiveDate) -> bool {
        self.start() <= day && day <= self.end()
    }

    /// Filter on a raw `published_at` string; unparseable strings are rejected.
    pub fn accepts_str(&self, published_at: &str) -> bool {
        parse_day(published_at).is_some_and(|day| self.accepts(day))
    }

    /// Every day covered, oldest first.
    pub fn days(&self) -> Vec<NaiveDate> {
        let span = (self.end() - self.start()).num_days();
        (0..=span).map(|i| self.start() + Duration::days(i)).collect()
    }
}
