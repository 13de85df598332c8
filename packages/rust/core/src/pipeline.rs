//! Pipeline stages: fetch → extract → (deals) → enrich → (filter, sync).
//!
//! Each stage reads and writes files named by [`PathsConfig`](rackscan_shared::PathsConfig),
//! so stages can be run one at a time from the CLI.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use rackscan_browser::{Browser, WebDriverBrowser};
use rackscan_crawler::{
    CrawlObserver, EnrichOptions, EnrichReport, EnrichmentCrawler, ListingLoader, LoadOutcome,
};
use rackscan_shared::{AppConfig, RackscanError, Result};
use rackscan_storage::{Storage, SyncReport};
use rackscan_table::{CsvCheckpoint, read_enriched, read_products, write_atomic, write_products};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: CrawlObserver {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl CrawlObserver for SilentProgress {}

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Result of [`fetch_listing`].
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub path: PathBuf,
    pub outcome: LoadOutcome,
    /// Capture timestamp written into the snapshot.
    pub fetched_at: String,
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Load the listing in a WebDriver session and write the snapshot.
pub async fn fetch_listing(
    config: &AppConfig,
    output: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<FetchResult> {
    progress.phase("Starting browser session");
    let browser = WebDriverBrowser::launch(&config.browser).await?;
    let result = fetch_listing_with(&browser, config, output, progress).await;
    if let Err(e) = browser.quit().await {
        warn!(error = %e, "failed to end browser session");
    }
    result
}

/// [`fetch_listing`] against an already open browser.
#[instrument(skip_all, fields(url = %config.loader.listing_url))]
pub async fn fetch_listing_with<B: Browser>(
    browser: &B,
    config: &AppConfig,
    output: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<FetchResult> {
    let start = Instant::now();
    let loader = ListingLoader::new(config.loader.clone(), config.consent.clone())?;

    progress.phase("Loading listing");
    let loaded = loader.load(browser, progress).await?;

    progress.phase("Writing snapshot");
    let path = output.map_or_else(|| config.paths.snapshot(), Path::to_path_buf);
    let rendered = loaded.snapshot.render();
    write_atomic(&path, rendered.as_bytes())?;

    let result = FetchResult {
        path,
        outcome: loaded.outcome,
        fetched_at: loaded.snapshot.timestamp(),
        bytes: rendered.len(),
        elapsed: start.elapsed(),
    };
    info!(
        path = %result.path.display(),
        state = %result.outcome.state,
        items = result.outcome.item_count,
        "snapshot written"
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub path: PathBuf,
    pub records: usize,
    pub tiles: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

/// Turn the snapshot into the extracted product table.
#[instrument(skip_all)]
pub fn extract_listing(
    config: &AppConfig,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<ExtractResult> {
    let input = input.map_or_else(|| config.paths.snapshot(), Path::to_path_buf);
    let output = output.map_or_else(|| config.paths.products(), Path::to_path_buf);

    let html = std::fs::read_to_string(&input).map_err(|e| RackscanError::io(&input, e))?;
    let extraction = rackscan_extract::extract(&html, &config.extract)?;
    write_products(&output, &extraction.records)?;

    Ok(ExtractResult {
        path: output,
        records: extraction.records.len(),
        tiles: extraction.tiles,
        skipped: extraction.skipped,
        duplicates: extraction.duplicates,
    })
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

/// Input selection for an enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub limit: usize,
}

impl From<&AppConfig> for EnrichArgs {
    fn from(config: &AppConfig) -> Self {
        Self {
            input: config.paths.shortlist(),
            output: config.paths.enriched(),
            limit: config.enrichment.limit,
        }
    }
}

/// Enrich the input table in a WebDriver session.
pub async fn enrich_table(
    config: &AppConfig,
    args: &EnrichArgs,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport> {
    // Fail on a bad input before starting a browser.
    let records = read_products(&args.input)?;

    progress.phase("Starting browser session");
    let browser = WebDriverBrowser::launch(&config.browser).await?;
    let result = enrich_records_with(&browser, config, records, args, progress).await;
    if let Err(e) = browser.quit().await {
        warn!(error = %e, "failed to end browser session");
    }
    result
}

/// [`enrich_table`] against an already open browser.
pub async fn enrich_table_with<B: Browser>(
    browser: &B,
    config: &AppConfig,
    args: &EnrichArgs,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport> {
    let records = read_products(&args.input)?;
    enrich_records_with(browser, config, records, args, progress).await
}

#[instrument(skip_all, fields(input = %args.input.display(), limit = args.limit))]
async fn enrich_records_with<B: Browser>(
    browser: &B,
    config: &AppConfig,
    records: Vec<rackscan_shared::ProductRecord>,
    args: &EnrichArgs,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport> {
    let options = EnrichOptions {
        limit: args.limit,
        ..EnrichOptions::from(config)
    };
    let crawler = EnrichmentCrawler::new(options);
    let mut sink = CsvCheckpoint::new(args.output.clone());

    progress.phase("Enriching products");
    crawler.run(browser, records, &mut sink, progress).await
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Load the enriched table into the price-history database.
pub async fn sync_history(
    config: &AppConfig,
    input: Option<&Path>,
    database: Option<&Path>,
) -> Result<SyncReport> {
    let input = input.map_or_else(|| config.paths.enriched(), Path::to_path_buf);
    let database = database.map_or_else(|| config.paths.database(), Path::to_path_buf);

    let rows = read_enriched(&input)?;
    let storage = Storage::open(&database).await?;
    storage.sync_enriched(&rows).await
}
