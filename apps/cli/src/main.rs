//! rackscan CLI: crawl a sale listing and find the deals worth a look.
//!
//! Runs the pipeline stages (fetch, extract, deals, enrich, filter, sync)
//! against files in the configured data directory.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
