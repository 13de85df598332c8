//! Post-enrichment filter on wanted sizes and minimum discount.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, instrument};

use rackscan_shared::{AppConfig, DealsConfig, EnrichedRecord, Result};
use rackscan_table::{append_history, read_enriched, write_enriched};

/// Keeps rows offering a wanted size at a deep enough discount.
#[derive(Debug, Clone)]
pub struct SizeFilter {
    wanted: BTreeSet<String>,
    min_discount_percent: f64,
}

impl SizeFilter {
    pub fn new<I, S>(wanted: I, min_discount_percent: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            wanted: wanted
                .into_iter()
                .map(|s| s.as_ref().split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            min_discount_percent,
        }
    }

    pub fn wanted(&self) -> &BTreeSet<String> {
        &self.wanted
    }

    pub fn keep(&self, row: &EnrichedRecord) -> bool {
        let Some(summary) = row.available_sizes.as_ref() else {
            return false;
        };
        let sizes_ok = !summary.sizes().is_disjoint(&self.wanted);
        let discount_ok = row
            .discount_percent()
            .is_some_and(|d| d >= self.min_discount_percent);
        sizes_ok && discount_ok
    }
}

impl From<&DealsConfig> for SizeFilter {
    fn from(config: &DealsConfig) -> Self {
        Self::new(&config.wanted_sizes, config.min_discount_percent)
    }
}

/// File locations used by [`run_filter`].
#[derive(Debug, Clone)]
pub struct FilterPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    pub history: PathBuf,
}

impl From<&AppConfig> for FilterPaths {
    fn from(config: &AppConfig) -> Self {
        Self {
            input: config.paths.enriched(),
            output: config.paths.filtered(),
            history: config.paths.verified_history(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub input_rows: usize,
    pub kept: usize,
}

/// Filter the enriched table into `output` and append the kept rows to history.
#[instrument(skip_all, fields(input = %paths.input.display()))]
pub fn run_filter(paths: &FilterPaths, filter: &SizeFilter) -> Result<FilterReport> {
    let rows = read_enriched(&paths.input)?;
    let kept = filter_rows(&rows, filter);

    write_enriched(&paths.output, &kept)?;
    append_history(&paths.history, &kept)?;

    let report = FilterReport {
        input_rows: rows.len(),
        kept: kept.len(),
    };
    info!(
        kept = report.kept,
        of = report.input_rows,
        output = %paths.output.display(),
        "size filter applied"
    );
    Ok(report)
}

pub fn filter_rows(rows: &[EnrichedRecord], filter: &SizeFilter) -> Vec<EnrichedRecord> {
    rows.iter().filter(|r| filter.keep(r)).cloned().collect()
}
