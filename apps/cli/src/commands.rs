//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use rackscan_core::deals::{DealsPaths, run_deals};
use rackscan_core::pipeline::{
    EnrichArgs, ProgressReporter, enrich_table, extract_listing, fetch_listing, sync_history,
};
use rackscan_core::report::{ReportPaths, run_report};
use rackscan_core::sizes::{FilterPaths, SizeFilter, run_filter};
use rackscan_crawler::{ConvergenceState, CrawlObserver};
use rackscan_shared::{
    AppConfig, EnrichmentSummary, config_file_path, init_config_at, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rackscan: sale-listing crawler and deal finder.
#[derive(Parser)]
#[command(
    name = "rackscan",
    version,
    about = "Crawl a sale listing, score the deals, and check size availability.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.rackscan/rackscan.toml).
    #[arg(long, global = true, env = "RACKSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load the full listing and write the snapshot.
    Fetch {
        /// Listing URL (defaults to loader.listing_url).
        #[arg(long)]
        url: Option<String>,

        /// Snapshot file (defaults to the configured data dir).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract product records from the snapshot.
    Extract {
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score the extracted table and write the shortlist.
    Deals {
        /// Extracted table (defaults to the products file).
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Visit color variants and record available sizes.
    Enrich {
        /// Number of leading rows to enrich.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Input table (defaults to the shortlist).
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Enriched table, rewritten after every record.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Keep enriched rows with a wanted size and enough discount.
    Filter {
        /// Wanted sizes, comma-separated (defaults to deals.wanted_sizes).
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<String>>,

        /// Minimum discount in percent (defaults to deals.min_discount_percent).
        #[arg(long)]
        min_discount: Option<f64>,
    },

    /// Write the HTML report over the scored table.
    Report {
        /// Scored table (defaults to the scored file).
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Enriched table to take available sizes from.
        #[arg(long)]
        enriched: Option<PathBuf>,

        /// Leave the available sizes out.
        #[arg(long, conflicts_with = "enriched")]
        no_sizes: bool,

        /// Report file (defaults to the configured data dir).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the enriched table into the price-history database.
    Sync {
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Database file (defaults to the configured data dir).
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "rackscan=info",
        1 => "rackscan=debug",
        _ => "rackscan=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Fetch { url, output } => {
            cmd_fetch(resolve_config(config_path)?, url, output.as_deref()).await
        }
        Command::Extract { input, output } => cmd_extract(
            &resolve_config(config_path)?,
            input.as_deref(),
            output.as_deref(),
        ),
        Command::Deals { input } => cmd_deals(&resolve_config(config_path)?, input),
        Command::Enrich {
            limit,
            input,
            output,
        } => cmd_enrich(&resolve_config(config_path)?, limit, input, output).await,
        Command::Filter {
            sizes,
            min_discount,
        } => cmd_filter(&resolve_config(config_path)?, sizes, min_discount),
        Command::Report {
            input,
            enriched,
            no_sizes,
            output,
        } => cmd_report(&resolve_config(config_path)?, input, enriched, no_sizes, output),
        Command::Sync { input, database } => {
            cmd_sync(
                &resolve_config(config_path)?,
                input.as_deref(),
                database.as_deref(),
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(mut config: AppConfig, url: Option<String>, output: Option<&Path>) -> Result<()> {
    if let Some(url) = url {
        config.loader.listing_url = url;
    }
    info!(url = %config.loader.listing_url, "fetching listing");

    let reporter = CliProgress::new();
    let result = fetch_listing(&config, output, &reporter).await;
    reporter.finish();
    let result = result?;

    let verdict = match result.outcome.state {
        ConvergenceState::Converged => "converged",
        _ => "capped out before the count stabilized",
    };

    println!();
    println!("  Listing {verdict}.");
    println!("  Items:      {}", result.outcome.item_count);
    println!("  Iterations: {}", result.outcome.iterations);
    println!("  Fetched at: {}", result.fetched_at);
    println!("  Snapshot:   {} ({} bytes)", result.path.display(), result.bytes);
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_extract(config: &AppConfig, input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let result = extract_listing(config, input, output)?;

    println!();
    println!("  Tiles:      {}", result.tiles);
    println!("  Skipped:    {}", result.skipped);
    println!("  Duplicates: {}", result.duplicates);
    println!("  Records:    {}", result.records);
    println!("  Table:      {}", result.path.display());
    println!();

    Ok(())
}

fn cmd_deals(config: &AppConfig, input: Option<PathBuf>) -> Result<()> {
    let mut paths = DealsPaths::from(config);
    if let Some(input) = input {
        paths.input = input;
    }
    let report = run_deals(&paths)?;

    println!();
    println!("  Scored:      {} of {} rows", report.scored_rows, report.input_rows);
    for (action, count) in &report.actions {
        println!("    {:<14} {count}", action.label());
    }
    println!("  Selected:    {} ({} blocked)", report.selected, report.blocked);
    println!("  Target ids:  {}", report.target_ids);
    println!("  Shortlisted: {} -> {}", report.shortlisted, paths.shortlist.display());
    println!();

    Ok(())
}

async fn cmd_enrich(
    config: &AppConfig,
    limit: Option<usize>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let defaults = EnrichArgs::from(config);
    let args = EnrichArgs {
        input: input.unwrap_or(defaults.input),
        output: output.unwrap_or(defaults.output),
        limit: limit.unwrap_or(defaults.limit),
    };
    info!(input = %args.input.display(), limit = args.limit, "enriching");

    let reporter = CliProgress::new();
    let report = enrich_table(config, &args, &reporter).await;
    reporter.finish();
    let report = report?;

    println!();
    println!("  Enriched:    {} of {} rows", report.records_enriched, report.records_total);
    println!("  Unavailable: {}", report.records_unavailable);
    println!(
        "  Variants:    {} visited, {} failed",
        report.variants_attempted, report.variants_failed
    );
    println!("  Table:       {}", args.output.display());
    println!("  Time:        {:.1}s", report.duration.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_filter(config: &AppConfig, sizes: Option<Vec<String>>, min_discount: Option<f64>) -> Result<()> {
    let wanted = sizes.unwrap_or_else(|| config.deals.wanted_sizes.clone());
    let min_discount = min_discount.unwrap_or(config.deals.min_discount_percent);
    if !(0.0..=100.0).contains(&min_discount) {
        return Err(eyre!("--min-discount must be between 0 and 100, got {min_discount}"));
    }

    let filter = SizeFilter::new(&wanted, min_discount);
    let paths = FilterPaths::from(config);
    let report = run_filter(&paths, &filter)?;

    println!();
    println!(
        "  Kept {} of {} rows (sizes {}, discount >= {min_discount}%).",
        report.kept,
        report.input_rows,
        filter.wanted().iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("  Table: {}", paths.output.display());
    println!();

    Ok(())
}

fn cmd_report(
    config: &AppConfig,
    input: Option<PathBuf>,
    enriched: Option<PathBuf>,
    no_sizes: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let defaults = ReportPaths::from(config);
    let paths = ReportPaths {
        scored: input.unwrap_or(defaults.scored),
        enriched: if no_sizes { None } else { enriched.or(defaults.enriched) },
        output: output.unwrap_or(defaults.output),
    };
    let summary = run_report(&paths)?;

    println!();
    println!("  Products: {}", summary.rows);
    for (action, count) in &summary.top {
        println!("    {:<14} {count} in top list", action.label());
    }
    if summary.has_sizes {
        println!("  Sizes:    {} rows", summary.sized);
    }
    println!("  Report:   {}", summary.path.display());
    println!();

    Ok(())
}

async fn cmd_sync(config: &AppConfig, input: Option<&Path>, database: Option<&Path>) -> Result<()> {
    let report = sync_history(config, input, database).await?;

    println!();
    println!("  Rows:         {} ({} skipped)", report.records, report.skipped);
    println!(
        "  Products:     {} new, {} renamed",
        report.products_created, report.products_renamed
    );
    println!("  Variants:     {} new", report.variants_created);
    println!(
        "  Price points: {} new, {} already stored",
        report.price_points_inserted, report.price_points_existing
    );
    println!();

    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let path = init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl CrawlObserver for CliProgress {
    fn listing_measured(&self, iteration: u32, count: u64, state: ConvergenceState) {
        self.spinner
            .set_message(format!("Scrolling [{iteration}] {count} items, {state}"));
    }

    fn record_started(&self, index: usize, total: usize, name: &str) {
        self.spinner
            .set_message(format!("Enriching [{}/{total}] {name}", index + 1));
    }

    fn record_finished(&self, index: usize, total: usize, summary: &EnrichmentSummary) {
        self.spinner.println(format!("  [{}/{total}] {summary}", index + 1));
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }
}
