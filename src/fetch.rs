//! HTTP page fetching with exponential backoff retry logic.
//!
//! Every network-facing fetcher goes through this module. It distinguishes
//! transient failures (timeouts, HTTP 429, 5xx) from permanent ones, and
//! retries only the former.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`FetchAsync`]: core trait defining one page fetch
//! - [`HttpFetcher`]: wraps a configured `reqwest::Client`
//! - [`RetryFetch`]: decorator that adds retry logic to any `FetchAsync`
//!   implementation
//!
//! # Retry Strategy
//!
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//! - Only transient failures are retried; a 404 fails immediately

use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::error::{PipelineError, Result};

/// User-Agent sent with every upstream request, so operators of the
/// measurement API and report site can identify this collector.
pub const USER_AGENT: &str = concat!("censorship-autocollect/", env!("CARGO_PKG_VERSION"));

/// One upstream page request: endpoint URL plus query parameters.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Absolute endpoint URL.
    pub url: String,
    /// Query string parameters, appended in order.
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    /// A request with no query parameters.
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }
}

/// Trait for fetching one upstream page.
///
/// Implementors take a [`PageRequest`] and produce a response. The
/// abstraction exists so [`RetryFetch`] can decorate any fetcher, and so
/// tests can script failures without a network.
pub trait FetchAsync {
    /// The type of response produced by a successful fetch.
    type Response;

    /// Fetch one page.
    ///
    /// # Errors
    ///
    /// [`PipelineError::FetchTransient`] for failures worth retrying;
    /// anything else is permanent for this request.
    async fn fetch(&self, page: &PageRequest) -> Result<Self::Response>;
}

/// HTTP fetcher over a configured `reqwest::Client`.
///
/// Applies the per-request timeout and project User-Agent, and classifies
/// failures: timeouts, connection errors, HTTP 429 and 5xx become
/// [`PipelineError::FetchTransient`]; other HTTP errors are permanent.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given per-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl FetchAsync for HttpFetcher {
    type Response = String;

    #[instrument(level = "debug", skip_all, fields(url = %page.url))]
    async fn fetch(&self, page: &PageRequest) -> Result<String> {
        let response = self
            .client
            .get(&page.url)
            .query(&page.query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PipelineError::FetchTransient(format!("{} ({e})", page.url))
                } else {
                    PipelineError::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PipelineError::FetchTransient(format!(
                "HTTP {status} from {}",
                page.url
            )));
        }

        let response = response.error_for_status()?;
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::FetchTransient(format!("body read timeout ({e})"))
            } else {
                PipelineError::Http(e)
            }
        })?;
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`]
/// implementation.
///
/// Only transient failures are retried. When `max_retries` is exceeded the
/// error becomes [`PipelineError::FetchExhausted`], which fetchers treat as
/// "skip this page, keep the run going".
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up on a page.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    /// Create a new retry wrapper around an existing [`FetchAsync`]
    /// implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying fetcher to wrap
    /// * `max_retries` - Maximum number of retry attempts per page
    /// * `base_delay` - Initial delay between retries
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
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

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    type Response = T::Response;

    #[instrument(level = "debug", skip_all, fields(url = %page.url))]
    async fn fetch(&self, page: &PageRequest) -> Result<T::Response> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(page).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(PipelineError::FetchExhausted {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }

                    // backoff calc; shift capped, the 30s ceiling hits long before it
                    let shift = (attempt - 1).min(16) as u32;
                    let mut delay = self.base_delay.saturating_mul(1u32 << shift);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Sleep the polite inter-request delay with up to 25% random jitter.
pub async fn polite_delay(base_secs: f64) {
    if base_secs <= 0.0 {
        return;
    }
    let jitter: f64 = rng().random_range(0.0..=0.25);
    sleep(StdDuration::from_secs_f64(base_secs * (1.0 + jitter))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted fetcher: fails transiently `failures` times, then succeeds.
    struct Flaky {
        failures: usize,
        calls: Mutex<usize>,
    }

    impl FetchAsync for Flaky {
        type Response = &'static str;

        async fn fetch(&self, _page: &PageRequest) -> Result<&'static str> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(PipelineError::FetchTransient("HTTP 503".into()))
            } else {
                Ok("page body")
            }
        }
    }

    /// Fetcher that always fails with a permanent error.
    struct NotFound;

    impl FetchAsync for NotFound {
        type Response = &'static str;

        async fn fetch(&self, _page: &PageRequest) -> Result<&'static str> {
            Err(PipelineError::Parse("HTTP 404".into()))
        }
    }

    fn page() -> PageRequest {
        PageRequest::bare("https://upstream.example/api")
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = Flaky {
            failures: 2,
            calls: Mutex::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 3, StdDuration::from_millis(1));
        let body = fetcher.fetch(&page()).await.unwrap();
        assert_eq!(body, "page body");
        assert_eq!(*fetcher.inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_three_failures_with_two_retries_exhausts() {
        let flaky = Flaky {
            failures: 3,
            calls: Mutex::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 2, StdDuration::from_millis(1));
        let err = fetcher.fetch(&page()).await.unwrap_err();
        match err {
            PipelineError::FetchExhausted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"));
            }
            other => panic!("expected FetchExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_retry() {
        let fetcher = RetryFetch::new(NotFound, 5, StdDuration::from_millis(1));
        let err = fetcher.fetch(&page()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
