//! AccessNow STOP dataset filter.
//!
//! The STOP shutdown tracker ships as a CSV export. This fetcher reads a
//! local copy and keeps the rows whose narrative text mentions one of the
//! platform keywords, writing them out with the original columns intact.
//! No network is involved; the export is a file the operator downloads.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::FetchSummary;
use crate::utils::keyword_regex;

/// Header substrings that mark a column as narrative text worth matching.
/// When no header matches, every column is scanned.
pub const TEXT_COLUMN_HINTS: &[&str] = &["title", "descr", "notes", "summary", "narrative"];

/// Columns to match keywords against, by index.
fn text_column_indices(headers: &[String]) -> Vec<usize> {
    let hinted: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let h = h.to_lowercase();
            TEXT_COLUMN_HINTS.iter().any(|hint| h.contains(hint))
        })
        .map(|(idx, _)| idx)
        .collect();
    if hinted.is_empty() {
        (0..headers.len()).collect()
    } else {
        hinted
    }
}

/// Filter the STOP export at `csv_in` into `out`, keeping rows whose text
/// columns mention any of `keywords`.
///
/// Unreadable CSV records are counted and skipped. The output keeps the
/// input's own column set; this artifact feeds the conversion step, not the
/// master table directly.
#[instrument(level = "info", skip_all, fields(csv_in = %csv_in.display()))]
pub fn run(csv_in: &Path, out: &Path, keywords: &[String]) -> Result<FetchSummary> {
    let pattern = keyword_regex(keywords)?;

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(csv_in)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let text_cols = text_column_indices(&headers);
    info!(
        columns = headers.len(),
        text_columns = text_cols.len(),
        "scanning STOP export"
    );

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // Flexible both ways: real STOP exports carry ragged rows
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(out)?;
    writer.write_record(&headers)?;

    let mut summary = FetchSummary::default();
    let mut scanned = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unreadable STOP row; skipping");
                summary.parse_errors += 1;
                continue;
            }
        };
        scanned += 1;

        let matched = text_cols
            .iter()
            .filter_map(|&idx| record.get(idx))
            .any(|cell| pattern.is_match(cell));
        if matched {
            writer.write_record(&record)?;
            summary.rows += 1;
        }
    }
    writer.flush()?;

    info!(
        scanned,
        matched = summary.rows,
        parse_errors = summary.parse_errors,
        "STOP filter complete"
    );
    Ok(summary)
}
