//! Pipeline orchestration and deal logic for rackscan.
//!
//! This crate ties together listing loading, tile extraction, deal scoring,
//! variant enrichment, price-history sync, and the HTML report into the
//! stages the CLI runs.

pub mod deals;
pub mod pipeline;
pub mod report;
pub mod sizes;

pub use deals::{Action, DealsPaths, DealsReport, ScoredRow, run_deals, score};
pub use pipeline::{
    EnrichArgs, ExtractResult, FetchResult, ProgressReporter, SilentProgress, enrich_table,
    enrich_table_with, extract_listing, fetch_listing, fetch_listing_with, sync_history,
};
pub use report::{Report, ReportPaths, ReportRow, ReportSummary, render_html, run_report};
pub use sizes::{FilterPaths, FilterReport, SizeFilter, run_filter};
