//! Command-line interface definitions for the case collector.
//!
//! This module defines the CLI arguments and options using the `clap`
//! crate. Each subcommand corresponds to one independently invoked pipeline
//! step; no step calls another programmatically.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::schema::{FOCUS_COUNTRIES, PLATFORM_KEYWORDS};

/// Command-line arguments for the censorship case collector.
///
/// # Examples
///
/// ```sh
/// # Pull confirmed blocking measurements for two platforms
/// censorship_autocollect ooni \
///   --domains tiktok.com,twitter.com --countries IN,TR \
///   --since 2020-01-01 --confirmed-only --out output/ooni_results.csv
///
/// # Scrape ten listing pages of NetBlocks reports
/// censorship_autocollect netblocks --pages 10
///
/// # Merge LLM-converted cases into the master table
/// censorship_autocollect append --in-jsonl output/cases.jsonl --touch-last-updated
/// ```
#[derive(Parser, Debug)]
#[command(name = "censorship_autocollect", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch measurements from the OONI measurement API
    Ooni {
        /// Comma-separated domains, e.g. 'tiktok.com,twitter.com'
        #[arg(long)]
        domains: String,

        /// Comma-separated ISO2 probe countries, e.g. 'IN,TR,RU'
        #[arg(long, default_value = FOCUS_COUNTRIES)]
        countries: String,

        /// Inclusive start of the date window (YYYY-MM-DD)
        #[arg(long, default_value = "2018-01-01")]
        since: String,

        /// Inclusive end of the date window (YYYY-MM-DD); defaults to today
        #[arg(long)]
        until: Option<String>,

        /// OONI test name to query
        #[arg(long, default_value = "web_connectivity")]
        test_name: String,

        /// Page size per request
        #[arg(long, default_value_t = 300)]
        limit: usize,

        /// Base delay between page requests, seconds
        #[arg(long, default_value_t = 1.0)]
        sleep: f64,

        /// Per-request timeout, seconds
        #[arg(long, default_value_t = 90)]
        timeout: u64,

        /// Retry attempts per page before skipping it
        #[arg(long, default_value_t = 3)]
        retries: usize,

        /// Only include measurements marked confirmed by OONI
        #[arg(long)]
        confirmed_only: bool,

        /// Page each calendar month separately (avoids deep-offset stalls)
        #[arg(long)]
        monthly_windows: bool,

        /// Output CSV path
        #[arg(long, default_value = "output/ooni_results.csv")]
        out: PathBuf,
    },

    /// Scrape NetBlocks report pages for platform blocking incidents
    Netblocks {
        /// How many listing pages to scan
        #[arg(long, default_value_t = 5)]
        pages: u32,

        /// Comma-separated platform keywords to match in titles and text
        #[arg(long, default_value = PLATFORM_KEYWORDS)]
        keywords: String,

        /// Comma-separated ISO2 countries to match in report prose
        #[arg(long, default_value = FOCUS_COUNTRIES)]
        countries: String,

        /// Per-request timeout, seconds
        #[arg(long, default_value_t = 90)]
        timeout: u64,

        /// Retry attempts per page before skipping it
        #[arg(long, default_value_t = 4)]
        retries: usize,

        /// Base delay between requests, seconds
        #[arg(long, default_value_t = 1.25)]
        sleep: f64,

        /// Pretty JSON summary path
        #[arg(long, default_value = "output/netblocks_platform_cases.json")]
        out_json: PathBuf,

        /// Streamed JSONL path (input shape for the conversion step)
        #[arg(long, default_value = "output/netblocks_platform_cases.jsonl")]
        out_jsonl: PathBuf,
    },

    /// Filter a local AccessNow STOP export for platform incidents
    Accessnow {
        /// Path to the downloaded STOP CSV export
        #[arg(long)]
        csv: PathBuf,

        /// Comma-separated platform keywords
        #[arg(long, default_value = PLATFORM_KEYWORDS)]
        keywords: String,

        /// Output CSV path
        #[arg(long, default_value = "output/stop_platform_cases.csv")]
        out: PathBuf,
    },

    /// Normalize LLM-converted JSONL cases and merge them into the master table
    Append {
        /// JSONL file of converted case objects, one per line
        #[arg(long)]
        in_jsonl: PathBuf,

        /// Master case table (created with the registry header when absent)
        #[arg(long, default_value = "data/case_schema.csv")]
        master: PathBuf,

        /// Stamp today's date on every row touched by this run
        #[arg(long)]
        touch_last_updated: bool,
    },

    /// Left-join the master table against a platform profile
    Annotate {
        /// Master case table
        #[arg(long, default_value = "data/case_schema.csv")]
        cases_csv: PathBuf,

        /// Platform profile reference table
        #[arg(long)]
        profile_csv: PathBuf,

        /// Annotated output table
        #[arg(long, default_value = "data/case_schema_annotated.csv")]
        out_csv: PathBuf,

        /// Join on (platform, country) instead of platform alone
        #[arg(long)]
        by_country: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ooni_parsing_with_defaults() {
        let cli = Cli::parse_from([
            "censorship_autocollect",
            "ooni",
            "--domains",
            "tiktok.com,twitter.com",
            "--confirmed-only",
        ]);
        match cli.command {
            Command::Ooni {
                domains,
                countries,
                since,
                limit,
                confirmed_only,
                monthly_windows,
                ..
            } => {
                assert_eq!(domains, "tiktok.com,twitter.com");
                assert_eq!(countries, FOCUS_COUNTRIES);
                assert_eq!(since, "2018-01-01");
                assert_eq!(limit, 300);
                assert!(confirmed_only);
                assert!(!monthly_windows);
            }
            other => panic!("expected ooni, parsed {other:?}"),
        }
    }

    #[test]
    fn test_append_parsing() {
        let cli = Cli::parse_from([
            "censorship_autocollect",
            "append",
            "--in-jsonl",
            "output/cases.jsonl",
            "--touch-last-updated",
        ]);
        match cli.command {
            Command::Append {
                in_jsonl,
                master,
                touch_last_updated,
            } => {
                assert_eq!(in_jsonl, PathBuf::from("output/cases.jsonl"));
                assert_eq!(master, PathBuf::from("data/case_schema.csv"));
                assert!(touch_last_updated);
            }
            other => panic!("expected append, parsed {other:?}"),
        }
    }

    #[test]
    fn test_annotate_requires_profile() {
        assert!(Cli::try_parse_from(["censorship_autocollect", "annotate"]).is_err());
    }
}
