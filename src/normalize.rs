//! The case normalizer: one raw JSON record in, one [`CaseRecord`] out.
//!
//! Every source-specific field-name and shape difference is isolated here,
//! so the master append never needs to know where a record came from. The
//! input is usually one line of the LLM-converted JSONL, but any JSON
//! object keyed by registry column names is accepted.
//!
//! Rules:
//! - keys outside the schema registry are dropped;
//! - scalar values are coerced to strings, arrays joined with `"; "`;
//! - the required fields (`case_id`, `country`, `platform`, `start_date`)
//!   must be present and non-empty;
//! - dates must be ISO, and `end_date` may not precede `start_date`;
//! - a missing `source` defaults to `llm-conversion`.
//!
//! Normalizing is a fixed point: running a normalized record's canonical
//! JSON back through yields an equal record.

use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{CaseRecord, CaseSource};
use crate::schema::{CASE_SCHEMA, REQUIRED_FIELDS};
use crate::utils::parse_iso_date;

/// Normalize one raw record into the master schema's row shape.
///
/// # Errors
///
/// [`PipelineError::Parse`] when the input is not a JSON object;
/// [`PipelineError::SchemaViolation`] when a required field is missing or a
/// date is malformed. Both fail the record, never the run.
pub fn normalize_case(raw: &Value) -> Result<CaseRecord> {
    let obj = raw
        .as_object()
        .ok_or_else(|| PipelineError::Parse("record is not a JSON object".into()))?;

    let mut case = CaseRecord::default();
    let mut dropped = 0usize;
    for (key, value) in obj {
        if !CASE_SCHEMA.contains(&key.as_str()) {
            dropped += 1;
            continue;
        }
        case.set_field(key, &coerce_cell(key, value)?)?;
    }
    if dropped > 0 {
        debug!(dropped, "dropped fields outside the case schema");
    }

    for field in REQUIRED_FIELDS {
        if case.field(field).is_empty() {
            return Err(PipelineError::SchemaViolation(format!(
                "missing required field: {field}"
            )));
        }
    }

    let start = parse_iso_date("start_date", &case.start_date)?;
    if !case.end_date.is_empty() {
        let end = parse_iso_date("end_date", &case.end_date)?;
        if end < start {
            return Err(PipelineError::SchemaViolation(format!(
                "end_date {} precedes start_date {}",
                case.end_date, case.start_date
            )));
        }
    }

    if case.source.is_none() {
        case.source = Some(CaseSource::LlmConversion);
    }

    Ok(case)
}

/// Flatten one JSON value into a CSV-safe cell.
fn coerce_cell(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => {
            let cells: Result<Vec<String>> =
                items.iter().map(|v| coerce_cell(field, v)).collect();
            Ok(cells?.join("; "))
        }
        Value::Object(_) => Err(PipelineError::SchemaViolation(format!(
            "field {field} has an unsupported nested shape"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_llm_record() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "India",
            "platform": "TikTok",
            "start_date": "2020-06-29"
        });
        let case = normalize_case(&raw).unwrap();
        assert_eq!(case.case_id, "IN-20200629-TIKTOK");
        assert_eq!(case.end_date, "");
        assert_eq!(case.source, Some(CaseSource::LlmConversion));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = json!({
            "case_id": "TR-20210101-TWITTER",
            "country": "Turkey",
            "iso2": "TR",
            "platform": "Twitter",
            "start_date": "2021-01-01",
            "end_date": "2021-02-01",
            "evidence_urls": "https://example.org/report",
            "notes": "bandwidth throttling first"
        });
        let once = normalize_case(&raw).unwrap();
        let twice = normalize_case(&once.to_value()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_required_field_is_schema_violation() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "India",
            "start_date": "2020-06-29"
        });
        let err = normalize_case(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation(_)));
        assert!(err.to_string().contains("platform"));
    }

    #[test]
    fn test_empty_required_field_is_schema_violation() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "",
            "platform": "TikTok",
            "start_date": "2020-06-29"
        });
        assert!(normalize_case(&raw).is_err());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "India",
            "platform": "TikTok",
            "start_date": "2020-06-29",
            "end_date": "2020-06-01"
        });
        let err = normalize_case(&raw).unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "India",
            "platform": "TikTok",
            "start_date": "2020-06-29",
            "confidence": 0.93,
            "model_name": "some-llm"
        });
        let case = normalize_case(&raw).unwrap();
        assert_eq!(case.field("confidence"), "");
        assert_eq!(case.to_value().as_object().unwrap().len(), CASE_SCHEMA.len());
    }

    #[test]
    fn test_arrays_joined_with_semicolons() {
        let raw = json!({
            "case_id": "NG-20210605-TWITTER",
            "country": "Nigeria",
            "platform": "Twitter",
            "start_date": "2021-06-05",
            "evidence_urls": ["https://a.example/one", "https://b.example/two"],
            "suspected_motives": ["political", "protest suppression"]
        });
        let case = normalize_case(&raw).unwrap();
        assert_eq!(
            case.evidence_urls,
            "https://a.example/one; https://b.example/two"
        );
        assert_eq!(case.field("suspected_motives"), "political; protest suppression");
    }

    #[test]
    fn test_explicit_source_tag_kept() {
        let raw = json!({
            "case_id": "ET-20201104-FACEBOOK",
            "country": "Ethiopia",
            "platform": "Facebook",
            "start_date": "2020-11-04",
            "source": "report-scrape"
        });
        let case = normalize_case(&raw).unwrap();
        assert_eq!(case.source, Some(CaseSource::ReportScrape));
    }

    #[test]
    fn test_unknown_source_tag_rejected() {
        let raw = json!({
            "case_id": "ET-20201104-FACEBOOK",
            "country": "Ethiopia",
            "platform": "Facebook",
            "start_date": "2020-11-04",
            "source": "fax-machine"
        });
        assert!(normalize_case(&raw).is_err());
    }

    #[test]
    fn test_non_object_is_parse_error() {
        let err = normalize_case(&json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_nested_object_rejected() {
        let raw = json!({
            "case_id": "IN-20200629-TIKTOK",
            "country": "India",
            "platform": "TikTok",
            "start_date": "2020-06-29",
            "notes": {"free": "text"}
        });
        assert!(normalize_case(&raw).is_err());
    }
}
