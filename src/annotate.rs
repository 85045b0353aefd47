//! Feature annotation: left join of the master table against a platform
//! profile.
//!
//! The profile CSV is a user-maintained reference table mapping a platform
//! (optionally a platform + country pair) to static feature taxonomy
//! columns. Annotation writes a new table — the master rows with the
//! feature columns appended — and never drops or invents a row.
//!
//! A join key matching more than one reference row with no tie-break is an
//! error ([`PipelineError::AmbiguousJoin`]); the annotator will not pick
//! one arbitrarily.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::master::read_master;
use crate::models::AnnotateSummary;
use crate::schema::{FEATURE_COLS, annotated_schema};

/// Join key into the profile table: platform, optionally disambiguated by
/// country.
type JoinKey = (String, Option<String>);

/// One profile row's feature cells, in [`FEATURE_COLS`] order.
type FeatureRow = Vec<String>;

/// Load the platform profile into a join map.
///
/// # Errors
///
/// [`PipelineError::SchemaMismatch`] when the profile lacks the join
/// column(s); [`PipelineError::AmbiguousJoin`] when two rows share a key.
fn load_profile(path: &Path, by_country: bool) -> Result<HashMap<JoinKey, FeatureRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let platform_idx = headers.iter().position(|h| h == "platform").ok_or_else(|| {
        PipelineError::SchemaMismatch(format!(
            "profile {} has no platform column",
            path.display()
        ))
    })?;
    let country_idx = if by_country {
        Some(headers.iter().position(|h| h == "country").ok_or_else(|| {
            PipelineError::SchemaMismatch(format!(
                "profile {} has no country column for a by-country join",
                path.display()
            ))
        })?)
    } else {
        None
    };

    // Feature columns the profile actually carries; missing ones stay empty
    let feature_idx: Vec<Option<usize>> = FEATURE_COLS
        .iter()
        .map(|col| headers.iter().position(|h| h == *col))
        .collect();

    let mut profile: HashMap<JoinKey, FeatureRow> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let platform = record.get(platform_idx).unwrap_or("").trim().to_string();
        if platform.is_empty() {
            continue;
        }
        let country = country_idx.map(|idx| record.get(idx).unwrap_or("").trim().to_string());
        let key: JoinKey = (platform, country);

        let features: FeatureRow = feature_idx
            .iter()
            .map(|idx| {
                idx.and_then(|i| record.get(i))
                    .unwrap_or("")
                    .trim()
                    .to_string()
            })
            .collect();

        if profile.contains_key(&key) {
            return Err(PipelineError::AmbiguousJoin(format!(
                "profile has multiple rows for platform {:?}{}",
                key.0,
                match &key.1 {
                    Some(c) => format!(" in country {c:?}"),
                    None => " with no country tie-break".to_string(),
                }
            )));
        }
        profile.insert(key, features);
    }
    Ok(profile)
}

/// The `annotate` subcommand: master table + profile → annotated table.
///
/// # Arguments
///
/// * `cases_csv` - The master table (validated against the schema registry)
/// * `profile_csv` - The platform profile reference table
/// * `out_csv` - Destination for the annotated table
/// * `by_country` - Join on `(platform, country)` instead of `platform`
#[instrument(level = "info", skip_all, fields(out = %out_csv.display()))]
pub fn run(
    cases_csv: &Path,
    profile_csv: &Path,
    out_csv: &Path,
    by_country: bool,
) -> Result<AnnotateSummary> {
    let rows = read_master(cases_csv)?;
    let profile = load_profile(profile_csv, by_country)?;

    if let Some(parent) = out_csv.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(out_csv)?;
    writer.write_record(annotated_schema())?;

    let empty_features: FeatureRow = FEATURE_COLS.iter().map(|_| String::new()).collect();
    let mut summary = AnnotateSummary::default();
    for case in &rows {
        let key: JoinKey = (
            case.platform.clone(),
            by_country.then(|| case.country.clone()),
        );
        let features = match profile.get(&key) {
            Some(features) => {
                summary.matched += 1;
                features
            }
            None => &empty_features,
        };

        let mut row = case.to_row();
        row.extend(features.iter().cloned());
        writer.write_record(&row)?;
        summary.rows += 1;
    }
    writer.flush()?;

    info!(
        rows = summary.rows,
        matched = summary.matched,
        "wrote annotated table"
    );
    Ok(summary)
}
