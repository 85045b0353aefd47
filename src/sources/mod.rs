//! Source fetchers for pulling censorship incidents from upstream feeds.
//!
//! This module contains submodules for collecting from the supported data
//! sources. Each fetcher follows the same contract:
//!
//! 1. **Fetch**: pull raw records, page by page, with retries and a polite
//!    inter-request delay
//! 2. **Filter**: keep only records passing the source-specific filter
//! 3. **Write**: emit an intermediate artifact in the source's native shape
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Origin tag |
//! |--------|--------|--------|------------|
//! | OONI measurement API | [`ooni`] | JSON API, offset paging | `measurement-api` |
//! | NetBlocks reports | [`netblocks`] | HTML scraping | `report-scrape` |
//! | AccessNow STOP dataset | [`accessnow`] | local CSV filter | `shutdown-tracker` |
//!
//! # Common Patterns
//!
//! Fetchers are generic over [`crate::fetch::FetchAsync`] so tests can
//! script upstream behavior. Exhausted retries skip the affected page and
//! the run keeps everything fetched before it; malformed upstream records
//! are counted and skipped, never fatal. Re-running with the same
//! parameters rewrites the output artifact from scratch.

pub mod accessnow;
pub mod netblocks;
pub mod ooni;
