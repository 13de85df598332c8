//! Ingesting an enriched table into the price-history database.

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use rackscan_shared::{EnrichedRecord, Result, parse_price};

use crate::Storage;

/// Audience of a product, derived from its URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Woman,
    Man,
    Unknown,
}

impl Gender {
    pub fn from_url(url: &str) -> Self {
        let url = url.to_lowercase();
        if url.contains("/damen") || url.contains("/women") {
            Self::Woman
        } else if url.contains("/men") || url.contains("/herren") {
            Self::Man
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Woman => "woman",
            Self::Man => "man",
            Self::Unknown => "unknown",
        }
    }
}

/// Numeric observation of one variant at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub promo_price: Option<f64>,
    pub original_price: Option<f64>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub discount_percent: Option<f64>,
    pub fetched_at: String,
}

impl PricePoint {
    pub fn from_record(record: &EnrichedRecord) -> Self {
        let digits: String = record.review_count.chars().filter(char::is_ascii_digit).collect();
        Self {
            promo_price: parse_price(&record.promo_price),
            original_price: parse_price(&record.original_price),
            rating: record.rating.trim().parse().ok(),
            reviews: digits.parse().ok(),
            discount_percent: record.discount_percent(),
            fetched_at: record.fetched_at.clone(),
        }
    }
}

/// Counts from one [`Storage::sync_enriched`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub records: usize,
    /// Rows without a product id or without a finalized summary.
    pub skipped: usize,
    pub products_created: usize,
    pub products_renamed: usize,
    pub variants_created: usize,
    pub price_points_inserted: usize,
    /// Price points already present from an earlier sync.
    pub price_points_existing: usize,
}

/// SHA-256 over the normalized identity of one price point.
pub fn row_hash(record: &EnrichedRecord, color: &str, size: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [
        record.product_id.trim(),
        color,
        size,
        record.promo_price.trim(),
        record.original_price.trim(),
        record.rating.trim(),
        record.review_count.trim(),
        record.fetched_at.trim(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

impl Storage {
    /// Ingest `rows`, one price point per available (color, size).
    ///
    /// Rows with an `Unavailable` summary still register their product but
    /// produce no variants.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn sync_enriched(&self, rows: &[EnrichedRecord]) -> Result<SyncReport> {
        let mut report = SyncReport {
            records: rows.len(),
            ..SyncReport::default()
        };

        for record in rows {
            let product_id = record.product_id.trim();
            let Some(summary) = record.available_sizes.as_ref() else {
                report.skipped += 1;
                continue;
            };
            if product_id.is_empty() {
                debug!(name = %record.name, "skipping row without product id");
                report.skipped += 1;
                continue;
            }

            let gender = Gender::from_url(&record.product_url);
            let product = self
                .upsert_product(product_id, record.name.trim(), gender, &record.product_url)
                .await?;
            if product.created {
                report.products_created += 1;
            }
            if product.updated {
                report.products_renamed += 1;
            }

            let point = PricePoint::from_record(record);
            for (color, sizes) in summary.blocks() {
                if color.is_empty() {
                    warn!(%product_id, "size block without color, skipping");
                    continue;
                }
                for size in sizes {
                    let variant = self
                        .ensure_variant(
                            &product.id,
                            &color,
                            &size,
                            &record.product_url,
                            &record.fetched_at,
                        )
                        .await?;
                    if variant.created {
                        report.variants_created += 1;
                    }

                    let hash = row_hash(record, &color, &size);
                    if self.insert_price_point(&variant.id, &point, &hash).await? {
                        report.price_points_inserted += 1;
                    } else {
                        report.price_points_existing += 1;
                    }
                }
            }
        }

        info!(
            products_created = report.products_created,
            variants_created = report.variants_created,
            inserted = report.price_points_inserted,
            existing = report.price_points_existing,
            skipped = report.skipped,
            "sync complete"
        );
        Ok(report)
    }
}
