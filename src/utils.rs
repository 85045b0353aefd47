//! Utility functions for argument parsing, text cleanup, and date windows.
//!
//! This module provides helper functions used throughout the application:
//! - Comma-separated list parsing for CLI arguments
//! - Whitespace normalization and char-safe truncation for scraped prose
//! - Calendar-month windowing for deep API queries
//! - ISO date helpers for `last_updated` stamping

use chrono::{Datelike, Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};

/// Split a comma-separated CLI argument into trimmed, non-empty items.
///
/// Spaces after commas are fine: `"tiktok.com, twitter.com"` yields two
/// entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a comma-separated list of ISO2 codes, uppercasing each.
pub fn split_country_list(raw: &str) -> Vec<String> {
    split_list(raw)
        .into_iter()
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace to single spaces and trim the ends.
///
/// Scraped article text arrives full of newlines and indentation; this
/// flattens it to a single readable line.
pub fn clean_spaces(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Truncate a string to at most `max` characters, never splitting a
/// multi-byte character.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Build a case-insensitive, word-boundary regex matching any of the given
/// keywords.
///
/// Used for platform keyword filters: `Twitter` matches "Twitter ban" but
/// not "Twitterati". An empty keyword list yields a regex that matches
/// nothing.
pub fn keyword_regex(keywords: &[String]) -> Result<Regex> {
    let parts: Vec<String> = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| regex::escape(k))
        .collect();
    let pattern = if parts.is_empty() {
        // match nothing
        r"[^\s\S]".to_string()
    } else {
        format!(r"(?i)\b({})\b", parts.join("|"))
    };
    Regex::new(&pattern).map_err(|e| PipelineError::Parse(format!("bad keyword pattern: {e}")))
}

/// Today's date in `YYYY-MM-DD`, used for `last_updated` stamps and as the
/// default `--until` bound.
pub fn today_iso() -> String {
    Local::now().date_naive().to_string()
}

/// Parse a `YYYY-MM-DD` date, reporting a schema violation naming the field
/// on failure.
pub fn parse_iso_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        PipelineError::SchemaViolation(format!("field {field} is not an ISO date: {value:?}"))
    })
}

/// Split a date range into calendar-month windows.
///
/// Deep offset paging against the measurement API stalls on large ranges;
/// querying month by month keeps every window shallow. The first and last
/// windows are clipped to the requested bounds.
///
/// # Returns
///
/// Inclusive `(start, end)` pairs in `YYYY-MM-DD`, oldest first. Empty when
/// `until` precedes `since`.
pub fn month_windows(since: &str, until: &str) -> Result<Vec<(String, String)>> {
    let since = parse_iso_date("since", since)?;
    let until = parse_iso_date("until", until)?;

    let mut windows = Vec::new();
    let mut cursor = since;
    while cursor <= until {
        let month_end = last_day_of_month(cursor);
        let end = month_end.min(until);
        windows.push((cursor.to_string(), end.to_string()));
        cursor = end + Duration::days(1);
    }
    Ok(windows)
}

fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    // First of next month always exists
    NaiveDate::from_ymd_opt(year, month, 1).unwrap() - Duration::days(1)
}
