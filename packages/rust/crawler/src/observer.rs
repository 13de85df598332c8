use rackscan_shared::EnrichmentSummary;

use crate::loader::ConvergenceState;

/// Receives progress notifications from the loader and the enrichment crawler.
///
/// All methods default to no-ops.
pub trait CrawlObserver: Send + Sync {
    /// One listing measurement was taken.
    fn listing_measured(&self, _iteration: u32, _count: u64, _state: ConvergenceState) {}

    /// Enrichment of record `index` (0-based) of `total` is starting.
    fn record_started(&self, _index: usize, _total: usize, _name: &str) {}

    /// One variant visit finished, successfully or not.
    fn variant_finished(&self, _url: &str, _ok: bool) {}

    /// Record `index` was finalized and checkpointed.
    fn record_finished(&self, _index: usize, _total: usize, _summary: &EnrichmentSummary) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}
