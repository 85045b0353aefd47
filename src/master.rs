//! Master table append: insert-or-update cases by `case_id`.
//!
//! The master CSV is the only durable cross-run state. Each append reads it
//! in full, merges the incoming records in memory, and rewrites the whole
//! file. No locking is provided; running two appends against the same table
//! concurrently is the operator's responsibility to avoid.
//!
//! # Merge policy
//!
//! Re-appending an existing `case_id` updates the row rather than
//! duplicating it: a non-empty incoming field overwrites, an empty incoming
//! field preserves the existing value. Row order is stable — existing rows
//! keep their position, new rows append at the end.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::models::{AppendSummary, CaseRecord};
use crate::normalize::normalize_case;
use crate::schema::CASE_SCHEMA;
use crate::utils::today_iso;

/// Read the full master table.
///
/// A missing file is an empty table. A present file whose header row does
/// not equal the schema registry exactly fails the run with
/// [`PipelineError::SchemaMismatch`] — silently reshaping the table would
/// corrupt it.
pub fn read_master(path: &Path) -> Result<Vec<CaseRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers != CASE_SCHEMA {
        return Err(PipelineError::SchemaMismatch(format!(
            "{} has columns {:?}, registry expects {:?}",
            path.display(),
            headers,
            CASE_SCHEMA
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(CaseRecord::from_row(&record?)?);
    }
    Ok(rows)
}

/// Load LLM-converted case objects from a JSONL file, normalizing each.
///
/// One JSON object per line; blank lines are ignored. Unparseable lines and
/// records failing normalization are skipped and counted, never fatal.
///
/// # Returns
///
/// The normalized records plus the count of skipped lines.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_jsonl(path: &Path) -> Result<(Vec<CaseRecord>, usize)> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "unparseable JSONL line; skipping");
                skipped += 1;
                continue;
            }
        };
        match normalize_case(&raw) {
            Ok(case) => records.push(case),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "record failed normalization; skipping");
                skipped += 1;
            }
        }
    }

    info!(count = records.len(), skipped, "loaded JSONL case records");
    Ok((records, skipped))
}

/// Merge normalized records into the master table and rewrite it.
///
/// # Arguments
///
/// * `path` - Master CSV path; created with the registry header when absent
/// * `records` - Normalized records to insert or merge
/// * `touch_last_updated` - When set, stamps today's date on every row
///   touched in this run (untouched rows keep their old stamp)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn append_cases(
    path: &Path,
    records: Vec<CaseRecord>,
    touch_last_updated: bool,
) -> Result<AppendSummary> {
    let existing = read_master(path)?;

    let mut order: Vec<String> = Vec::with_capacity(existing.len());
    let mut table: HashMap<String, CaseRecord> = HashMap::with_capacity(existing.len());
    for row in existing {
        order.push(row.case_id.clone());
        table.insert(row.case_id.clone(), row);
    }

    let mut summary = AppendSummary::default();
    let mut touched: Vec<String> = Vec::new();
    for incoming in records {
        let id = incoming.case_id.clone();
        match table.get_mut(&id) {
            Some(row) => {
                row.merge_from(&incoming);
                summary.updated += 1;
            }
            None => {
                order.push(id.clone());
                table.insert(id.clone(), incoming);
                summary.inserted += 1;
            }
        }
        if !touched.contains(&id) {
            touched.push(id);
        }
    }

    if touch_last_updated {
        let today = today_iso();
        for id in &touched {
            if let Some(row) = table.get_mut(id) {
                row.last_updated = today.clone();
            }
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CASE_SCHEMA)?;
    for id in &order {
        // Every id in `order` was inserted into the table above
        if let Some(row) = table.get(id) {
            writer.write_record(row.to_row())?;
        }
    }
    writer.flush()?;

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        total = order.len(),
        "rewrote master table"
    );
    Ok(summary)
}

/// The `append` subcommand: JSONL in, master CSV updated in place.
pub fn run(in_jsonl: &Path, master: &Path, touch_last_updated: bool) -> Result<AppendSummary> {
    let (records, skipped) = load_jsonl(in_jsonl)?;
    let mut summary = append_cases(master, records, touch_last_updated)?;
    summary.skipped = skipped;
    Ok(summary)
}
