//! # Censorship Autocollect
//!
//! A collection pipeline that gathers publicly reported internet-censorship
//! incidents from several external sources and normalizes them into a
//! common case table.
//!
//! ## Sources
//!
//! - The OONI measurement API (confirmed blocking measurements)
//! - NetBlocks report pages (scraped incident write-ups)
//! - The AccessNow STOP shutdown-tracking dataset (local CSV export)
//!
//! ## Architecture
//!
//! The pipeline is a set of independently invoked steps:
//! 1. **Fetch**: each source fetcher pulls raw records and writes an
//!    intermediate artifact in the source's native shape
//! 2. **Convert**: an external text-to-JSON step (not this program) turns
//!    free-text incidents into one JSON case object per line
//! 3. **Append**: converted records are normalized against the schema
//!    registry and merged into the master table by `case_id`
//! 4. **Annotate**: a left join attaches static platform features
//!
//! ## Usage
//!
//! ```sh
//! censorship_autocollect ooni --domains tiktok.com --countries IN --confirmed-only
//! censorship_autocollect append --in-jsonl output/cases.jsonl --touch-last-updated
//! ```

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod annotate;
mod cli;
mod error;
mod fetch;
mod master;
mod models;
mod normalize;
mod schema;
mod sources;
mod utils;

use cli::{Cli, Command};
use fetch::{HttpFetcher, RetryFetch};
use sources::{accessnow, netblocks, ooni};
use utils::{split_country_list, split_list, today_iso};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    match args.command {
        Command::Ooni {
            domains,
            countries,
            since,
            until,
            test_name,
            limit,
            sleep,
            timeout,
            retries,
            confirmed_only,
            monthly_windows,
            out,
        } => {
            let query = ooni::OoniQuery {
                domains: split_list(&domains),
                countries: split_country_list(&countries),
                since,
                until: until.unwrap_or_else(today_iso),
                test_name,
                limit,
                confirmed_only,
                monthly_windows,
                sleep_secs: sleep,
            };
            let fetcher =
                RetryFetch::new(HttpFetcher::new(timeout)?, retries, Duration::from_secs(1));
            let summary = ooni::run(&fetcher, &query, &out).await?;
            info!(
                rows = summary.rows,
                skipped_pages = summary.skipped_pages,
                parse_errors = summary.parse_errors,
                out = %out.display(),
                "wrote OONI results"
            );
        }

        Command::Netblocks {
            pages,
            keywords,
            countries,
            timeout,
            retries,
            sleep,
            out_json,
            out_jsonl,
        } => {
            let query = netblocks::NetblocksQuery {
                pages,
                keywords: split_list(&keywords),
                countries: split_country_list(&countries),
                sleep_secs: sleep,
            };
            let fetcher =
                RetryFetch::new(HttpFetcher::new(timeout)?, retries, Duration::from_secs(1));
            let summary = netblocks::run(&fetcher, &query, &out_json, &out_jsonl).await?;
            info!(
                rows = summary.rows,
                skipped_pages = summary.skipped_pages,
                out_json = %out_json.display(),
                out_jsonl = %out_jsonl.display(),
                "wrote NetBlocks reports"
            );
        }

        Command::Accessnow { csv, keywords, out } => {
            let summary = accessnow::run(&csv, &out, &split_list(&keywords))?;
            info!(
                matched = summary.rows,
                parse_errors = summary.parse_errors,
                out = %out.display(),
                "wrote filtered STOP cases"
            );
        }

        Command::Append {
            in_jsonl,
            master: master_path,
            touch_last_updated,
        } => {
            let summary = master::run(&in_jsonl, &master_path, touch_last_updated)?;
            info!(
                inserted = summary.inserted,
                updated = summary.updated,
                skipped = summary.skipped,
                master = %master_path.display(),
                "appended cases to master table"
            );
        }

        Command::Annotate {
            cases_csv,
            profile_csv,
            out_csv,
            by_country,
        } => {
            let summary = annotate::run(&cases_csv, &profile_csv, &out_csv, by_country)?;
            info!(
                rows = summary.rows,
                matched = summary.matched,
                out = %out_csv.display(),
                "wrote annotated table"
            );
        }
    }

    Ok(())
}
