//! Checkpointed enrichment crawler.
//!
//! Visits every color variant of the first N products, summarizes the
//! available sizes per product, and persists the whole working table after
//! each product so an interrupted run leaves a usable partial result.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use rackscan_browser::{Browser, Page};
use rackscan_shared::{
    AppConfig, ConsentConfig, EnrichedRecord, EnrichmentConfig, EnrichmentSummary, ProductRecord,
    Result, VariantResult,
};
use rackscan_table::CheckpointSink;

use crate::observer::CrawlObserver;
use crate::variant::VariantScraper;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime options for an enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Only the first `limit` records are enriched.
    pub limit: usize,
    pub enrichment: EnrichmentConfig,
    pub consent: ConsentConfig,
}

impl From<&AppConfig> for EnrichOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            limit: config.enrichment.limit,
            enrichment: config.enrichment.clone(),
            consent: config.consent.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Working set
// ---------------------------------------------------------------------------

/// Per-record enrichment progress. A record only moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentState {
    Pending,
    Finalized(EnrichmentSummary),
}

#[derive(Debug, Clone)]
struct WorkItem {
    record: ProductRecord,
    state: EnrichmentState,
}

impl WorkItem {
    fn row(&self) -> EnrichedRecord {
        let mut row = EnrichedRecord::pending(&self.record);
        if let EnrichmentState::Finalized(summary) = &self.state {
            row.available_sizes = Some(summary.clone());
        }
        row
    }
}

fn snapshot(items: &[WorkItem]) -> Vec<EnrichedRecord> {
    items.iter().map(WorkItem::row).collect()
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Summary of a finished enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichReport {
    /// Rows in the persisted table.
    pub records_total: usize,
    /// Rows that were visited this run.
    pub records_enriched: usize,
    /// Visited rows that ended with no usable variant.
    pub records_unavailable: usize,
    pub variants_attempted: usize,
    /// Variant visits that failed and were skipped.
    pub variants_failed: usize,
    pub checkpoints: usize,
    pub duration: Duration,
    /// Final table, in input order.
    pub rows: Vec<EnrichedRecord>,
}

// ---------------------------------------------------------------------------
// EnrichmentCrawler
// ---------------------------------------------------------------------------

/// Enriches product records with per-color size availability.
#[derive(Debug, Clone)]
pub struct EnrichmentCrawler {
    limit: usize,
    scraper: VariantScraper,
}

impl EnrichmentCrawler {
    pub fn new(options: EnrichOptions) -> Self {
        Self {
            limit: options.limit,
            scraper: VariantScraper::new(options.enrichment, options.consent),
        }
    }

    /// Enrich the first `limit` of `records`, checkpointing to `sink`.
    ///
    /// The table handed to `sink` always holds every input record in input
    /// order; records not yet processed carry an empty placeholder. Variant
    /// failures are logged and skipped. Only a checkpoint failure aborts.
    #[instrument(skip_all, fields(records = records.len(), limit = self.limit))]
    pub async fn run<B, O>(
        &self,
        browser: &B,
        records: Vec<ProductRecord>,
        sink: &mut dyn CheckpointSink,
        observer: &O,
    ) -> Result<EnrichReport>
    where
        B: Browser,
        O: CrawlObserver + ?Sized,
    {
        let start = Instant::now();
        let mut items: Vec<WorkItem> = records
            .into_iter()
            .map(|record| WorkItem {
                record,
                state: EnrichmentState::Pending,
            })
            .collect();

        let total = items.len();
        let target = self.limit.min(total);
        let mut checkpoints = 0;
        let mut variants_attempted = 0;
        let mut variants_failed = 0;
        let mut records_unavailable = 0;

        info!(total, target, "starting enrichment");

        // Initial checkpoint so the output exists from the start.
        sink.persist(&snapshot(&items))?;
        checkpoints += 1;

        for index in 0..target {
            let (name, urls) = {
                let record = &items[index].record;
                (record.name.clone(), record.variant_urls.clone())
            };
            observer.record_started(index, target, &name);

            let mut variants = Vec::with_capacity(urls.len());
            for url in &urls {
                variants_attempted += 1;
                match self.visit(browser, url).await {
                    Some(result) => {
                        observer.variant_finished(url, true);
                        variants.push(result);
                    }
                    None => {
                        variants_failed += 1;
                        observer.variant_finished(url, false);
                    }
                }
            }

            let summary = EnrichmentSummary::from_variants(&variants);
            if summary.is_unavailable() {
                records_unavailable += 1;
            }
            info!(
                index = index + 1,
                target,
                product = %name,
                sizes = %summary,
                "record enriched"
            );
            items[index].state = EnrichmentState::Finalized(summary.clone());

            sink.persist(&snapshot(&items))?;
            checkpoints += 1;
            observer.record_finished(index, target, &summary);
        }

        let report = EnrichReport {
            records_total: total,
            records_enriched: target,
            records_unavailable,
            variants_attempted,
            variants_failed,
            checkpoints,
            duration: start.elapsed(),
            rows: snapshot(&items),
        };

        info!(
            enriched = report.records_enriched,
            unavailable = report.records_unavailable,
            variants_failed = report.variants_failed,
            duration_ms = report.duration.as_millis(),
            "enrichment complete"
        );
        Ok(report)
    }

    /// Scrape one variant in a fresh page. The page is closed on every path.
    async fn visit<B: Browser>(&self, browser: &B, url: &str) -> Option<VariantResult> {
        let mut page = match browser.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(%url, error = %e, "could not open page for variant");
                return None;
            }
        };

        let scraped = self.scraper.scrape(&mut page, url).await;

        if let Err(e) = page.close().await {
            warn!(%url, error = %e, "failed to close variant page");
        }

        match scraped {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(%url, error = %e, "skipping variant");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::testing::{FakeBrowser, FakeVariant, RecordingSink, Script};
    use rackscan_shared::{FETCHED_AT_UNKNOWN, RackscanError};
    use rackscan_table::{CsvCheckpoint, read_enriched};

    fn options(limit: usize) -> EnrichOptions {
        EnrichOptions {
            limit,
            enrichment: EnrichmentConfig::default(),
            consent: ConsentConfig {
                settle_ms: 0,
                ..ConsentConfig::default()
            },
        }
    }

    fn record(id: &str, urls: &[&str]) -> ProductRecord {
        ProductRecord {
            product_id: id.into(),
            name: format!("Item {id}"),
            promo_price: "9,90 €".into(),
            original_price: "19,90 €".into(),
            rating: "4.2".into(),
            review_count: "8".into(),
            product_url: format!("https://shop.example.com/products/{id}"),
            variant_urls: urls.iter().map(|u| u.to_string()).collect(),
            fetched_at: FETCHED_AT_UNKNOWN.into(),
        }
    }

    fn sized(color: &str, labels: &[&str]) -> FakeVariant {
        FakeVariant {
            color_line: Some(format!("Farbe: 09 {color}")),
            size_labels: labels.iter().map(|l| l.to_string()).collect(),
            has_size_picker: true,
        }
    }

    #[tokio::test]
    async fn failing_variant_is_isolated() {
        let browser = FakeBrowser::new(Script {
            variants: [("urlA".to_string(), sized("BLACK", &["S (in stock)", "M"]))].into(),
            failing_urls: ["urlB".to_string()].into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = RecordingSink::default();

        let report = crawler
            .run(&browser, vec![record("T1", &["urlA", "urlB"])], &mut sink, &NoopObserver)
            .await
            .unwrap();

        let sizes = report.rows[0].available_sizes.as_ref().unwrap();
        assert_eq!(sizes.as_str(), "BLACK: S, M");
        assert_eq!(report.variants_attempted, 2);
        assert_eq!(report.variants_failed, 1);
    }

    #[tokio::test]
    async fn timed_out_variant_is_isolated() {
        let browser = FakeBrowser::new(Script {
            variants: [("urlA".to_string(), sized("BLACK", &["S", "M", "L (Unavailable)"]))].into(),
            timeout_urls: ["urlB".to_string()].into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = RecordingSink::default();

        let report = crawler
            .run(
                &browser,
                vec![record("T1", &["urlB", "urlA"]), record("T2", &["urlB"])],
                &mut sink,
                &NoopObserver,
            )
            .await
            .unwrap();

        assert_eq!(report.rows[0].available_sizes.as_ref().unwrap().as_str(), "BLACK: S, M");
        assert!(report.rows[1].available_sizes.as_ref().unwrap().is_unavailable());
        assert_eq!(report.records_enriched, 2);
        assert_eq!(report.variants_failed, 2);
        assert_eq!(browser.visits(), vec!["urlB", "urlA", "urlB"]);
        assert_eq!(browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn record_without_usable_variants_is_unavailable() {
        let browser = FakeBrowser::new(Script {
            variants: [
                // No color line.
                (
                    "no-color".to_string(),
                    FakeVariant {
                        color_line: None,
                        size_labels: vec!["M".into()],
                        has_size_picker: true,
                    },
                ),
                // Every size sold out.
                ("sold-out".to_string(), sized("RED", &["S (Unavailable)"])),
                // Size picker never shows up.
                (
                    "no-picker".to_string(),
                    FakeVariant {
                        has_size_picker: false,
                        ..sized("BLUE", &["L"])
                    },
                ),
            ]
            .into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = RecordingSink::default();

        let records = vec![
            record("E1", &["no-color", "sold-out", "no-picker"]),
            record("E2", &[]),
        ];
        let report = crawler
            .run(&browser, records, &mut sink, &NoopObserver)
            .await
            .unwrap();

        for row in &report.rows {
            assert!(row.available_sizes.as_ref().unwrap().is_unavailable());
        }
        assert_eq!(report.records_unavailable, 2);
    }

    #[tokio::test]
    async fn limit_leaves_later_rows_pending() {
        let browser = FakeBrowser::new(Script {
            variants: [("u".to_string(), sized("WHITE", &["L"]))].into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(2));
        let mut sink = RecordingSink::default();

        let records: Vec<_> = (1..=5).map(|i| record(&i.to_string(), &["u"])).collect();
        let report = crawler
            .run(&browser, records, &mut sink, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(report.records_total, 5);
        assert_eq!(report.records_enriched, 2);
        let finalized: Vec<bool> = report.rows.iter().map(|r| r.is_finalized()).collect();
        assert_eq!(finalized, vec![true, true, false, false, false]);
        assert_eq!(browser.visits(), vec!["u", "u"]);
    }

    #[tokio::test]
    async fn every_checkpoint_is_a_complete_prefix() {
        let browser = FakeBrowser::new(Script {
            variants: [("u".to_string(), sized("NAVY", &["M", "XL"]))].into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = RecordingSink::default();

        let records: Vec<_> = (1..=4).map(|i| record(&i.to_string(), &["u"])).collect();
        crawler
            .run(&browser, records, &mut sink, &NoopObserver)
            .await
            .unwrap();

        // One initial checkpoint plus one per record.
        assert_eq!(sink.snapshots.len(), 5);
        for (k, table) in sink.snapshots.iter().enumerate() {
            assert_eq!(table.len(), 4);
            for (i, row) in table.iter().enumerate() {
                assert_eq!(row.product_id, (i + 1).to_string());
                assert_eq!(row.is_finalized(), i < k, "checkpoint {k}, row {i}");
            }
        }
    }

    #[tokio::test]
    async fn every_opened_page_is_closed() {
        let browser = FakeBrowser::new(Script {
            variants: [
                ("ok".to_string(), sized("GREY", &["S"])),
                (
                    "slow".to_string(),
                    FakeVariant {
                        has_size_picker: false,
                        ..sized("GREY", &["S"])
                    },
                ),
            ]
            .into(),
            failing_urls: ["broken".to_string()].into(),
            ..Script::default()
        });
        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = RecordingSink::default();

        crawler
            .run(
                &browser,
                vec![record("P1", &["ok", "broken", "slow", "ok"])],
                &mut sink,
                &NoopObserver,
            )
            .await
            .unwrap();

        assert_eq!(browser.pages_opened(), 4);
        assert_eq!(browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn csv_checkpoint_is_readable_mid_run() {
        let dir = std::env::temp_dir().join(format!("rackscan-enrich-{}", uuid::Uuid::now_v7()));
        let path = dir.join("with-sizes.csv");
        let browser = FakeBrowser::new(Script {
            variants: [("u".to_string(), sized("BLACK", &["M"]))].into(),
            ..Script::default()
        });
        // Read the file from disk while the second record is being visited.
        let probe_path = path.clone();
        browser.on_visit(move |visit| {
            if visit == 2 {
                let rows = read_enriched(&probe_path).unwrap();
                assert_eq!(rows.len(), 3);
                assert!(rows[0].is_finalized());
                assert!(!rows[1].is_finalized());
                assert!(!rows[2].is_finalized());
            }
        });

        let crawler = EnrichmentCrawler::new(options(100));
        let mut sink = CsvCheckpoint::new(&path);
        let records: Vec<_> = (1..=3).map(|i| record(&i.to_string(), &["u"])).collect();
        crawler
            .run(&browser, records, &mut sink, &NoopObserver)
            .await
            .unwrap();

        let rows = read_enriched(&path).unwrap();
        assert!(rows.iter().all(|r| r.available_sizes.as_ref().unwrap().as_str() == "BLACK: M"));
        assert_eq!(browser.visits().len(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn checkpoint_failure_aborts_the_run() {
        struct Refusing;
        impl CheckpointSink for Refusing {
            fn persist(&mut self, _rows: &[EnrichedRecord]) -> Result<()> {
                Err(RackscanError::Table("disk full".into()))
            }
        }

        let browser = FakeBrowser::new(Script::default());
        let crawler = EnrichmentCrawler::new(options(100));
        let err = crawler
            .run(&browser, vec![record("1", &["u"])], &mut Refusing, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, RackscanError::Table(_)));
        assert!(browser.visits().is_empty());
    }
}
