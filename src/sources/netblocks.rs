//! NetBlocks report scraper.
//!
//! Walks the [NetBlocks reports](https://netblocks.org/reports) listing
//! pages, keeps articles whose title mentions a platform keyword, and
//! visits each article for a publication date and full text. Matched
//! platforms and countries are extracted from the title and body.
//!
//! Records stream to JSONL as they are found (one object per line, the
//! shape the text-to-JSON conversion step consumes) and a pretty JSON
//! summary is written at the end. Articles are deduplicated by URL.

use std::collections::HashSet;
use std::io::Write as _;
use std::path::Path;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::fetch::{FetchAsync, PageRequest, polite_delay};
use crate::models::FetchSummary;
use crate::schema::{country_name, iso2_for_name};
use crate::utils::{clean_spaces, keyword_regex, truncate_chars};

/// Listing page URL prefix; the 1-based page number is appended.
pub const LISTING_URL_PREFIX: &str = "https://netblocks.org/reports/page/";

/// Length caps for scraped prose, in characters.
const FULL_TEXT_CAP: usize = 8000;
const EXCERPT_CAP: usize = 500;
const SNIPPET_CAP: usize = 400;

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TIMESTAMP: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static OG_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static ENTRY_CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse(".entry-content").unwrap());

/// Query parameters for one scrape run.
#[derive(Debug, Clone)]
pub struct NetblocksQuery {
    /// How many listing pages to scan.
    pub pages: u32,
    /// Platform keywords the article title must mention.
    pub keywords: Vec<String>,
    /// ISO2 focus countries to match in report prose.
    pub countries: Vec<String>,
    /// Base delay between requests, seconds.
    pub sleep_secs: f64,
}

/// One matched report, in the scrape's native shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Article headline.
    pub title: String,
    /// Canonical article URL; the record's evidence trail.
    pub url: String,
    /// Publication timestamp from the article page (listing fallback).
    pub published_at: String,
    /// Listing-page snippet.
    pub snippet: String,
    /// Leading excerpt of the article body.
    pub excerpt: String,
    /// Platform keywords found in title + body, sorted and deduplicated.
    pub platform_matches: Vec<String>,
    /// ISO2 codes found in title + body, sorted and deduplicated.
    pub country_matches: Vec<String>,
}

/// One entry lifted off a listing page.
#[derive(Debug, Clone)]
struct ListingEntry {
    title: String,
    url: String,
    list_date: String,
    snippet: String,
}

/// Date and body text lifted off an article page.
#[derive(Debug, Default)]
struct DetailMeta {
    published_at: String,
    full_text: String,
    excerpt: String,
}

/// Scrape matching reports into `out_jsonl` (streamed) and `out_json`
/// (pretty summary, written at the end).
#[instrument(level = "info", skip_all, fields(pages = query.pages))]
pub async fn run<F>(
    fetcher: &F,
    query: &NetblocksQuery,
    out_json: &Path,
    out_jsonl: &Path,
) -> Result<FetchSummary>
where
    F: FetchAsync<Response = String>,
{
    let keyword_re = keyword_regex(&query.keywords)?;
    let country_re = country_regex(&query.countries)?;
    let base = Url::parse(LISTING_URL_PREFIX)
        .map_err(|e| PipelineError::Parse(format!("bad listing URL: {e}")))?;

    for path in [out_json, out_jsonl] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    let mut jsonl = std::fs::File::create(out_jsonl)?;

    let mut summary = FetchSummary::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut results: Vec<ReportRecord> = Vec::new();

    for page_no in 1..=query.pages {
        let listing_url = format!("{LISTING_URL_PREFIX}{page_no}");
        let body = match fetcher.fetch(&PageRequest::bare(&listing_url)).await {
            Ok(body) => body,
            Err(PipelineError::FetchExhausted { attempts, reason }) => {
                warn!(page = page_no, attempts, reason, "listing page retries exhausted; skipping");
                summary.skipped_pages += 1;
                polite_delay(query.sleep_secs).await;
                continue;
            }
            Err(e) => return Err(e),
        };
        summary.pages += 1;

        let (entries, bad_entries) = parse_listing(&body, &base);
        summary.parse_errors += bad_entries;
        info!(page = page_no, articles = entries.len(), "parsed listing page");

        for entry in entries {
            if entry.url.is_empty() || seen.contains(&entry.url) {
                continue;
            }
            // Title must mention a platform keyword before we spend a fetch
            if !keyword_re.is_match(&entry.title) {
                debug!(title = %entry.title, "no platform keyword in title; skipping");
                continue;
            }

            let detail = match fetcher.fetch(&PageRequest::bare(&entry.url)).await {
                Ok(html) => parse_detail(&html),
                Err(PipelineError::FetchExhausted { attempts, reason }) => {
                    warn!(url = %entry.url, attempts, reason, "article fetch exhausted; using listing data");
                    summary.skipped_pages += 1;
                    DetailMeta::default()
                }
                Err(e) => return Err(e),
            };

            let published_at = if detail.published_at.is_empty() {
                entry.list_date.clone()
            } else {
                detail.published_at
            };
            let excerpt = if detail.excerpt.is_empty() {
                entry.snippet.clone()
            } else {
                detail.excerpt
            };

            let hay = format!("{}\n{}", entry.title, detail.full_text);
            let platform_matches: Vec<String> = keyword_re
                .find_iter(&hay)
                .map(|m| m.as_str().to_string())
                .unique()
                .sorted()
                .collect();
            let country_matches: Vec<String> = country_re
                .find_iter(&hay)
                .map(|m| normalize_country(m.as_str()))
                .unique()
                .sorted()
                .collect();

            let record = ReportRecord {
                title: entry.title,
                url: entry.url.clone(),
                published_at,
                snippet: entry.snippet,
                excerpt,
                platform_matches,
                country_matches,
            };

            writeln!(jsonl, "{}", serde_json::to_string(&record)?)?;
            jsonl.flush()?;
            seen.insert(entry.url);
            results.push(record);
            summary.rows += 1;

            polite_delay(query.sleep_secs).await;
        }
    }

    std::fs::write(out_json, serde_json::to_string_pretty(&results)?)?;
    info!(
        rows = summary.rows,
        pages = summary.pages,
        skipped_pages = summary.skipped_pages,
        parse_errors = summary.parse_errors,
        "NetBlocks scrape complete"
    );
    Ok(summary)
}

/// Extract article entries from a listing page.
///
/// # Returns
///
/// The entries plus a count of article nodes missing a link (malformed,
/// counted and skipped).
fn parse_listing(html: &str, base: &Url) -> (Vec<ListingEntry>, usize) {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for article in document.select(&ARTICLE) {
        let title = article
            .select(&HEADLINE)
            .next()
            .map(|h| clean_spaces(&h.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default();
        let href = article
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .unwrap_or_default();
        if href.is_empty() {
            malformed += 1;
            continue;
        }
        let url = match base.join(href) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => {
                malformed += 1;
                continue;
            }
        };
        let list_date = article
            .select(&TIMESTAMP)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let snippet = truncate_chars(
            &clean_spaces(&article.text().collect::<Vec<_>>().join(" ")),
            SNIPPET_CAP,
        );

        entries.push(ListingEntry {
            title,
            url,
            list_date,
            snippet,
        });
    }
    (entries, malformed)
}

/// Extract the publication date and body text from an article page.
fn parse_detail(html: &str) -> DetailMeta {
    let document = Html::parse_document(html);

    let mut published_at = document
        .select(&TIMESTAMP)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if published_at.is_empty() {
        published_at = document
            .select(&OG_PUBLISHED)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
    }

    let content_text = document
        .select(&ARTICLE)
        .next()
        .or_else(|| document.select(&ENTRY_CONTENT).next())
        .map(|node| node.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| document.root_element().text().collect::<Vec<_>>().join(" "));
    let full_text = truncate_chars(&clean_spaces(&content_text), FULL_TEXT_CAP);
    let excerpt = truncate_chars(&full_text, EXCERPT_CAP);

    DetailMeta {
        published_at,
        full_text,
        excerpt,
    }
}

/// Regex matching the focus countries by ISO2 code or English name.
fn country_regex(iso2s: &[String]) -> Result<Regex> {
    let mut terms: Vec<String> = Vec::new();
    for code in iso2s {
        terms.push(code.clone());
        let name = country_name(code);
        if name != code {
            terms.push(name.to_string());
        }
    }
    keyword_regex(&terms)
}

/// Canonicalize a matched country mention to an ISO2 code.
fn normalize_country(found: &str) -> String {
    iso2_for_name(found)
        .map(str::to_string)
        .unwrap_or_else(|| found.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const LISTING_HTML: &str = r#"
        <html><body>
          <article>
            <h2>Twitter restricted in Turkey amid earthquake response</h2>
            <a href="/reports/twitter-restricted-turkey">read</a>
            <time datetime="2023-02-08T12:00:00+00:00">8 Feb</time>
            <p>Network data confirm the restriction.</p>
          </article>
          <article>
            <h2>Weather balloons spotted over the capital</h2>
            <a href="/reports/weather-balloons">read</a>
          </article>
          <article>
            <h2>TikTok disrupted in Pakistan</h2>
            <a href="/reports/tiktok-pakistan">read</a>
          </article>
          <article>
            <h2>Broken listing entry with no link</h2>
          </article>
        </body></html>
    "#;

    const DETAIL_HTML: &str = r#"
        <html><head>
          <meta property="article:published_time" content="2023-02-08T11:45:00+00:00">
        </head><body>
          <article>
            Real-time network data show Twitter has been restricted in Turkey.
            The measure comes as Turkey responds to the earthquake.
          </article>
        </body></html>
    "#;

    fn query() -> NetblocksQuery {
        NetblocksQuery {
            pages: 1,
            keywords: vec!["Twitter".into(), "TikTok".into()],
            countries: vec!["TR".into(), "PK".into()],
            sleep_secs: 0.0,
        }
    }

    /// Fetcher serving canned bodies by URL.
    struct FakeSite {
        pages: HashMap<String, String>,
        failures: Mutex<VecDeque<String>>,
    }

    impl FetchAsync for FakeSite {
        type Response = String;

        async fn fetch(&self, page: &PageRequest) -> Result<String> {
            if self.failures.lock().unwrap().iter().any(|u| *u == page.url) {
                return Err(PipelineError::FetchExhausted {
                    attempts: 3,
                    reason: "HTTP 503".into(),
                });
            }
            self.pages
                .get(&page.url)
                .cloned()
                .ok_or_else(|| PipelineError::Parse(format!("no fixture for {}", page.url)))
        }
    }

    #[test]
    fn test_parse_listing_extracts_entries_and_counts_malformed() {
        let base = Url::parse(LISTING_URL_PREFIX).unwrap();
        let (entries, malformed) = parse_listing(LISTING_HTML, &base);
        assert_eq!(entries.len(), 3);
        assert_eq!(malformed, 1);
        assert_eq!(
            entries[0].url,
            "https://netblocks.org/reports/twitter-restricted-turkey"
        );
        assert_eq!(entries[0].list_date, "2023-02-08T12:00:00+00:00");
        assert!(entries[0].title.starts_with("Twitter restricted"));
    }

    #[test]
    fn test_parse_detail_prefers_time_then_og_meta() {
        let meta = parse_detail(DETAIL_HTML);
        assert_eq!(meta.published_at, "2023-02-08T11:45:00+00:00");
        assert!(meta.full_text.contains("restricted in Turkey"));
        assert!(meta.excerpt.len() <= EXCERPT_CAP);

        let with_time = r#"<article><time datetime="2023-01-01T00:00:00Z"></time>text</article>"#;
        assert_eq!(parse_detail(with_time).published_at, "2023-01-01T00:00:00Z");
    }

    #[test]
    fn test_country_matching_normalizes_names_to_iso2() {
        let re = country_regex(&["TR".into(), "PK".into()]).unwrap();
        let hay = "Twitter restricted in Turkey; earlier disruption hit PK networks";
        let found: Vec<String> = re
            .find_iter(hay)
            .map(|m| normalize_country(m.as_str()))
            .unique()
            .sorted()
            .collect();
        assert_eq!(found, vec!["PK", "TR"]);
    }

    #[tokio::test]
    async fn test_run_filters_by_title_keyword_and_streams_jsonl() {
        let dir = tempdir().unwrap();
        let out_json = dir.path().join("netblocks.json");
        let out_jsonl = dir.path().join("netblocks.jsonl");

        let mut pages = HashMap::new();
        pages.insert(format!("{LISTING_URL_PREFIX}1"), LISTING_HTML.to_string());
        pages.insert(
            "https://netblocks.org/reports/twitter-restricted-turkey".to_string(),
            DETAIL_HTML.to_string(),
        );
        pages.insert(
            "https://netblocks.org/reports/tiktok-pakistan".to_string(),
            "<article>TikTok disrupted across Pakistan</article>".to_string(),
        );
        let site = FakeSite {
            pages,
            failures: Mutex::new(VecDeque::new()),
        };

        let summary = run(&site, &query(), &out_json, &out_jsonl).await.unwrap();
        // The weather-balloon article has no platform keyword
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.parse_errors, 1);

        let jsonl = std::fs::read_to_string(&out_jsonl).unwrap();
        let records: Vec<ReportRecord> = jsonl
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].platform_matches, vec!["Twitter"]);
        assert_eq!(records[0].country_matches, vec!["TR"]);
        assert_eq!(records[0].published_at, "2023-02-08T11:45:00+00:00");

        let pretty: Vec<ReportRecord> =
            serde_json::from_str(&std::fs::read_to_string(&out_json).unwrap()).unwrap();
        assert_eq!(pretty, records);
    }

    #[tokio::test]
    async fn test_detail_failure_falls_back_to_listing_data() {
        let dir = tempdir().unwrap();
        let out_json = dir.path().join("netblocks.json");
        let out_jsonl = dir.path().join("netblocks.jsonl");

        let mut pages = HashMap::new();
        pages.insert(format!("{LISTING_URL_PREFIX}1"), LISTING_HTML.to_string());
        pages.insert(
            "https://netblocks.org/reports/tiktok-pakistan".to_string(),
            "<article>TikTok disrupted across Pakistan</article>".to_string(),
        );
        let site = FakeSite {
            pages,
            failures: Mutex::new(VecDeque::from([
                "https://netblocks.org/reports/twitter-restricted-turkey".to_string(),
            ])),
        };

        let summary = run(&site, &query(), &out_json, &out_jsonl).await.unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.skipped_pages, 1);

        let jsonl = std::fs::read_to_string(&out_jsonl).unwrap();
        let first: ReportRecord = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
        // Listing date and snippet stand in for the unreachable article page
        assert_eq!(first.published_at, "2023-02-08T12:00:00+00:00");
        assert!(!first.snippet.is_empty());
    }
}
