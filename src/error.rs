//! Error types shared across the collection pipeline.
//!
//! Errors fall into three severity classes:
//!
//! - **Retryable**: [`PipelineError::FetchTransient`] — timeouts, rate
//!   limits, and 5xx responses. The fetch layer retries these with backoff.
//! - **Per-record**: [`PipelineError::Parse`] and
//!   [`PipelineError::SchemaViolation`] — a single upstream record is bad.
//!   Callers skip the record, count it, and report the count at the end.
//! - **Fatal**: [`PipelineError::SchemaMismatch`] and
//!   [`PipelineError::AmbiguousJoin`] — proceeding would corrupt the master
//!   table, so the whole run fails.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A network failure worth retrying: timeout, connection error,
    /// HTTP 429, or a 5xx response.
    #[error("transient fetch failure: {0}")]
    FetchTransient(String),

    /// Retries were exhausted for one page. The page is skipped; the run
    /// keeps everything fetched before it.
    #[error("fetch retries exhausted after {attempts} attempts: {reason}")]
    FetchExhausted { attempts: usize, reason: String },

    /// One malformed upstream record. Counted and skipped, never fatal.
    #[error("malformed upstream record: {0}")]
    Parse(String),

    /// A normalizer input missing or violating a required field. Fails the
    /// record, not the run.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// The on-disk master table's column set no longer matches the schema
    /// registry. Fails the whole append run.
    #[error("master table schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The annotation join key matches more than one reference row with no
    /// tie-break. Fails the whole annotation run.
    #[error("ambiguous annotation join: {0}")]
    AmbiguousJoin(String),

    /// A non-retryable HTTP failure (4xx other than 429, TLS, bad URL).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the fetch layer should retry the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::FetchTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
