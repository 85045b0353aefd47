//! OONI measurement API fetcher.
//!
//! Pulls web-connectivity measurements from the [OONI
//! API](https://api.ooni.io) for every (domain, country) pair in the query,
//! optionally keeping only measurements OONI marks as confirmed blocking.
//! Results land in a CSV in the API's native shape; the text-to-JSON
//! conversion step turns them into case records later.
//!
//! # Paging
//!
//! The API pages by offset. Deep offsets on large date ranges stall, so
//! `monthly_windows` splits the range into calendar-month windows and pages
//! each window from offset zero. A page whose retries are exhausted is
//! skipped along with the rest of its window; everything already written
//! stays on disk.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::fetch::{FetchAsync, PageRequest, polite_delay};
use crate::models::FetchSummary;
use crate::utils::month_windows;

/// The OONI measurements endpoint.
pub const MEASUREMENTS_API: &str = "https://api.ooni.io/api/v1/measurements";

/// Columns of the intermediate results CSV, in the API's native vocabulary.
pub const RESULT_COLUMNS: &[&str] = &[
    "domain",
    "country",
    "measurement_start_time",
    "anomaly",
    "confirmed",
    "blocking_country",
    "probe_asn",
    "probe_cc",
    "failure",
    "measurement_url",
];

/// Query parameters for one fetch run.
#[derive(Debug, Clone)]
pub struct OoniQuery {
    /// Domains to query, e.g. `tiktok.com`.
    pub domains: Vec<String>,
    /// ISO2 probe countries.
    pub countries: Vec<String>,
    /// Inclusive start of the date window, `YYYY-MM-DD`.
    pub since: String,
    /// Inclusive end of the date window, `YYYY-MM-DD`.
    pub until: String,
    /// OONI test name, normally `web_connectivity`.
    pub test_name: String,
    /// Page size per request.
    pub limit: usize,
    /// Keep only measurements marked confirmed by OONI.
    pub confirmed_only: bool,
    /// Page each calendar month separately instead of the whole range.
    pub monthly_windows: bool,
    /// Base delay between page requests, seconds.
    pub sleep_secs: f64,
}

/// One page of the measurements API response. Unknown keys are ignored;
/// a missing `results` array reads as empty.
#[derive(Debug, Deserialize)]
struct MeasurementPage {
    #[serde(default)]
    results: Vec<Value>,
}

/// Fetch all measurements matching the query into `out`.
#[instrument(level = "info", skip_all, fields(out = %out.display()))]
pub async fn run<F>(fetcher: &F, query: &OoniQuery, out: &Path) -> Result<FetchSummary>
where
    F: FetchAsync<Response = String>,
{
    let windows = if query.monthly_windows {
        month_windows(&query.since, &query.until)?
    } else {
        vec![(query.since.clone(), query.until.clone())]
    };

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(out)?;
    writer.write_record(RESULT_COLUMNS)?;

    let mut summary = FetchSummary::default();
    for domain in &query.domains {
        for country in &query.countries {
            for (win_since, win_until) in &windows {
                fetch_window(
                    fetcher,
                    query,
                    domain,
                    country,
                    win_since,
                    win_until,
                    &mut writer,
                    &mut summary,
                )
                .await?;
            }
        }
    }

    writer.flush()?;
    info!(
        pages = summary.pages,
        rows = summary.rows,
        skipped_pages = summary.skipped_pages,
        parse_errors = summary.parse_errors,
        "OONI fetch complete"
    );
    Ok(summary)
}

/// Page one (domain, country, window) triple until the API signals
/// exhaustion with a short page.
#[allow(clippy::too_many_arguments)]
async fn fetch_window<F, W>(
    fetcher: &F,
    query: &OoniQuery,
    domain: &str,
    country: &str,
    win_since: &str,
    win_until: &str,
    writer: &mut csv::Writer<W>,
    summary: &mut FetchSummary,
) -> Result<()>
where
    F: FetchAsync<Response = String>,
    W: std::io::Write,
{
    let mut offset = 0usize;
    loop {
        let page = PageRequest {
            url: MEASUREMENTS_API.to_string(),
            query: page_params(query, domain, country, win_since, win_until, offset),
        };

        let body = match fetcher.fetch(&page).await {
            Ok(body) => body,
            Err(PipelineError::FetchExhausted { attempts, reason }) => {
                warn!(
                    domain,
                    country,
                    offset,
                    attempts,
                    reason,
                    "page retries exhausted; skipping rest of window"
                );
                summary.skipped_pages += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let parsed: MeasurementPage = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(domain, country, offset, error = %e, "unparseable API page; skipping rest of window");
                summary.parse_errors += 1;
                return Ok(());
            }
        };

        summary.pages += 1;
        let got = parsed.results.len();
        for measurement in &parsed.results {
            match extract_row(domain, country, measurement) {
                Ok(row) => {
                    writer.write_record(&row)?;
                    summary.rows += 1;
                }
                Err(e) => {
                    warn!(domain, country, error = %e, "malformed measurement; skipping");
                    summary.parse_errors += 1;
                }
            }
        }
        // Keep already-fetched pages durable even if a later page fails
        writer.flush()?;

        if got < query.limit {
            return Ok(());
        }
        offset += query.limit;
        polite_delay(query.sleep_secs).await;
    }
}

/// Query string for one page request.
fn page_params(
    query: &OoniQuery,
    domain: &str,
    country: &str,
    since: &str,
    until: &str,
    offset: usize,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("domain".to_string(), domain.to_string()),
        ("probe_cc".to_string(), country.to_string()),
        ("since".to_string(), since.to_string()),
        ("until".to_string(), until.to_string()),
        ("test_name".to_string(), query.test_name.clone()),
        ("limit".to_string(), query.limit.to_string()),
        ("offset".to_string(), offset.to_string()),
    ];
    if query.confirmed_only {
        params.push(("confirmed".to_string(), "true".to_string()));
    }
    params
}

/// Project one measurement object onto [`RESULT_COLUMNS`].
///
/// Absent fields read as empty cells; a result that is not an object at all
/// is a malformed record.
fn extract_row(domain: &str, country: &str, measurement: &Value) -> Result<Vec<String>> {
    let obj = measurement
        .as_object()
        .ok_or_else(|| PipelineError::Parse("measurement is not a JSON object".into()))?;

    let cell = |key: &str| -> String {
        match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => other.to_string(),
        }
    };

    Ok(vec![
        domain.to_string(),
        country.to_string(),
        cell("measurement_start_time"),
        cell("anomaly"),
        cell("confirmed"),
        cell("blocking_country"),
        cell("probe_asn"),
        cell("probe_cc"),
        cell("failure"),
        cell("measurement_url"),
    ])
}
