//! Data models for censorship cases and run reporting.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`CaseRecord`]: one row of the master case table
//! - [`CaseSource`]: enumerated origin tag for a case
//! - Run summaries: [`FetchSummary`], [`AppendSummary`], [`AnnotateSummary`]
//!
//! A `CaseRecord` keeps the handful of columns the pipeline reasons about as
//! typed fields and carries every other registry column in a string map, so
//! the struct tracks [`crate::schema::CASE_SCHEMA`] without naming all of it.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::schema::CASE_SCHEMA;

/// Where a case entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSource {
    /// Confirmed-block measurements from the OONI API.
    MeasurementApi,
    /// The AccessNow STOP shutdown-tracking dataset.
    ShutdownTracker,
    /// Scraped NetBlocks report pages.
    ReportScrape,
    /// Structured JSON produced by the external text-to-JSON conversion.
    LlmConversion,
}

impl CaseSource {
    /// The tag written to the `source` column.
    pub fn as_tag(&self) -> &'static str {
        match self {
            CaseSource::MeasurementApi => "measurement-api",
            CaseSource::ShutdownTracker => "shutdown-tracker",
            CaseSource::ReportScrape => "report-scrape",
            CaseSource::LlmConversion => "llm-conversion",
        }
    }

    /// Parse a `source` tag. Unknown tags fail the record, not the run.
    pub fn from_tag(tag: &str) -> Result<CaseSource> {
        match tag {
            "measurement-api" => Ok(CaseSource::MeasurementApi),
            "shutdown-tracker" => Ok(CaseSource::ShutdownTracker),
            "report-scrape" => Ok(CaseSource::ReportScrape),
            "llm-conversion" => Ok(CaseSource::LlmConversion),
            other => Err(PipelineError::SchemaViolation(format!(
                "unknown source tag: {other:?}"
            ))),
        }
    }
}

/// One row of the master case table.
///
/// The columns the pipeline inspects (identity, dates, origin, evidence)
/// are typed fields; every other registry column lives in `extra`. Access
/// by registry column name goes through [`CaseRecord::field`] and
/// [`CaseRecord::set_field`], which is what the CSV and merge paths use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseRecord {
    /// Globally unique case identifier, conventionally
    /// `{ISO2}-{YYYYMMDD}-{PLATFORM}`.
    pub case_id: String,
    /// Country label, free text or ISO name.
    pub country: String,
    /// ISO2 country code, when known.
    pub iso2: String,
    /// Platform name from the controlled vocabulary.
    pub platform: String,
    /// First day of the restriction, `YYYY-MM-DD`.
    pub start_date: String,
    /// Last day of the restriction; empty while the case is ongoing.
    pub end_date: String,
    /// Origin tag; `None` when the row predates source tracking.
    pub source: Option<CaseSource>,
    /// Original source URLs, preserved verbatim.
    pub evidence_urls: String,
    /// `YYYY-MM-DD` of the last append that touched this row.
    pub last_updated: String,
    /// Remaining registry columns (method, scope, motives, notes, ...).
    pub extra: BTreeMap<String, String>,
}

impl CaseRecord {
    /// Read a registry column by name. Unknown columns read as empty.
    pub fn field(&self, column: &str) -> &str {
        match column {
            "case_id" => &self.case_id,
            "country" => &self.country,
            "iso2" => &self.iso2,
            "platform" => &self.platform,
            "start_date" => &self.start_date,
            "end_date" => &self.end_date,
            "source" => self.source.map(|s| s.as_tag()).unwrap_or(""),
            "evidence_urls" => &self.evidence_urls,
            "last_updated" => &self.last_updated,
            other => self.extra.get(other).map(String::as_str).unwrap_or(""),
        }
    }

    /// Write a registry column by name.
    ///
    /// Only `source` carries structure; everything else is stored as given.
    /// Columns outside the registry are rejected so the record can never
    /// drift from the schema.
    pub fn set_field(&mut self, column: &str, value: &str) -> Result<()> {
        match column {
            "case_id" => self.case_id = value.to_string(),
            "country" => self.country = value.to_string(),
            "iso2" => self.iso2 = value.to_string(),
            "platform" => self.platform = value.to_string(),
            "start_date" => self.start_date = value.to_string(),
            "end_date" => self.end_date = value.to_string(),
            "source" => {
                self.source = if value.is_empty() {
                    None
                } else {
                    Some(CaseSource::from_tag(value)?)
                };
            }
            "evidence_urls" => self.evidence_urls = value.to_string(),
            "last_updated" => self.last_updated = value.to_string(),
            other if CASE_SCHEMA.contains(&other) => {
                // Empty cells are not stored, so records stay canonical and
                // equality does not depend on which columns were ever written
                if value.is_empty() {
                    self.extra.remove(other);
                } else {
                    self.extra.insert(other.to_string(), value.to_string());
                }
            }
            other => {
                return Err(PipelineError::SchemaViolation(format!(
                    "column {other:?} is not in the case schema"
                )));
            }
        }
        Ok(())
    }

    /// Serialize to a CSV row in registry column order.
    pub fn to_row(&self) -> Vec<String> {
        CASE_SCHEMA
            .iter()
            .map(|col| self.field(col).to_string())
            .collect()
    }

    /// Build a record from a CSV row whose header was already validated
    /// against the registry.
    pub fn from_row(record: &csv::StringRecord) -> Result<CaseRecord> {
        let mut case = CaseRecord::default();
        for (idx, col) in CASE_SCHEMA.iter().enumerate() {
            case.set_field(col, record.get(idx).unwrap_or(""))?;
        }
        Ok(case)
    }

    /// The canonical JSON object for this record: every registry column,
    /// keyed by name. Feeding this back through the normalizer yields an
    /// equal record.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for col in CASE_SCHEMA {
            map.insert(col.to_string(), Value::String(self.field(col).to_string()));
        }
        Value::Object(map)
    }

    /// Merge policy for re-appended cases: a non-empty incoming field
    /// overwrites, an empty incoming field preserves what is already there.
    pub fn merge_from(&mut self, incoming: &CaseRecord) {
        for col in CASE_SCHEMA {
            let value = incoming.field(col);
            if !value.is_empty() {
                // Values coming from an existing CaseRecord are already valid
                self.set_field(col, value).ok();
            }
        }
    }
}

/// End-of-run report for a source fetcher.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Pages successfully fetched.
    pub pages: usize,
    /// Records written to the output artifact.
    pub rows: usize,
    /// Pages abandoned after retries were exhausted.
    pub skipped_pages: usize,
    /// Malformed upstream records counted and skipped.
    pub parse_errors: usize,
}

/// End-of-run report for a master append.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AppendSummary {
    /// Rows inserted under a new `case_id`.
    pub inserted: usize,
    /// Rows merged into an existing `case_id`.
    pub updated: usize,
    /// Input records dropped for parse or schema violations.
    pub skipped: usize,
}

/// End-of-run report for an annotation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnnotateSummary {
    /// Rows written to the annotated table.
    pub rows: usize,
    /// Rows that found a profile match.
    pub matched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CaseRecord {
        let mut case = CaseRecord {
            case_id: "IN-20200629-TIKTOK".into(),
            country: "India".into(),
            iso2: "IN".into(),
            platform: "TikTok".into(),
            start_date: "2020-06-29".into(),
            source: Some(CaseSource::LlmConversion),
            evidence_urls: "https://example.org/ban-order".into(),
            ..CaseRecord::default()
        };
        case.set_field("method_blocking", "app store removal").unwrap();
        case
    }

    #[test]
    fn test_source_tag_round_trip() {
        for source in [
            CaseSource::MeasurementApi,
            CaseSource::ShutdownTracker,
            CaseSource::ReportScrape,
            CaseSource::LlmConversion,
        ] {
            assert_eq!(CaseSource::from_tag(source.as_tag()).unwrap(), source);
        }
        assert!(CaseSource::from_tag("carrier-pigeon").is_err());
    }

    #[test]
    fn test_field_access_covers_typed_and_extra() {
        let case = sample();
        assert_eq!(case.field("case_id"), "IN-20200629-TIKTOK");
        assert_eq!(case.field("source"), "llm-conversion");
        assert_eq!(case.field("method_blocking"), "app store removal");
        assert_eq!(case.field("notes"), "");
    }

    #[test]
    fn test_set_field_rejects_unknown_column() {
        let mut case = CaseRecord::default();
        assert!(case.set_field("favorite_color", "blue").is_err());
    }

    #[test]
    fn test_row_round_trip() {
        let case = sample();
        let row = case.to_row();
        assert_eq!(row.len(), CASE_SCHEMA.len());
        let record = csv::StringRecord::from(row);
        let back = CaseRecord::from_row(&record).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn test_merge_non_empty_overwrites() {
        let mut existing = sample();
        existing.evidence_urls = String::new();

        let mut incoming = sample();
        incoming.evidence_urls = "https://example.org/new-evidence".into();
        incoming.country = String::new();

        existing.merge_from(&incoming);
        // Populated incoming field wins
        assert_eq!(existing.evidence_urls, "https://example.org/new-evidence");
        // Empty incoming field preserves what was there
        assert_eq!(existing.country, "India");
    }

    #[test]
    fn test_to_value_keys_match_registry() {
        let value = sample().to_value();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), CASE_SCHEMA.len());
        assert_eq!(obj["platform"], "TikTok");
        assert_eq!(obj["end_date"], "");
    }
}
