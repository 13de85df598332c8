//! Core domain types for rackscan product tables.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `Fetched At` value used when a snapshot carries no provenance marker.
pub const FETCHED_AT_UNKNOWN: &str = "Unknown";

/// Summary written for a record whose variants yielded no usable data.
pub const UNAVAILABLE: &str = "Unavailable";

/// Separator between variant URLs inside the `Color Variant URLs` column.
const VARIANT_URL_SEPARATOR: &str = " | ";

// ---------------------------------------------------------------------------
// ListingSnapshot
// ---------------------------------------------------------------------------

/// A captured listing document and the moment it was captured.
#[derive(Debug, Clone)]
pub struct ListingSnapshot {
    /// Serialized DOM of the fully loaded listing page.
    pub html: String,
    /// Capture time.
    pub fetched_at: DateTime<Utc>,
}

impl ListingSnapshot {
    pub fn new(html: String, fetched_at: DateTime<Utc>) -> Self {
        Self { html, fetched_at }
    }

    /// ISO-8601 capture time, millisecond precision, `Z` suffix.
    pub fn timestamp(&self) -> String {
        self.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// The document as written to disk: one provenance comment line, then the HTML.
    pub fn render(&self) -> String {
        format!("<!-- Fetched on {} -->\n{}", self.timestamp(), self.html)
    }
}

// ---------------------------------------------------------------------------
// ProductRecord
// ---------------------------------------------------------------------------

/// One extracted listing tile. Field order is the column order of the
/// extracted table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Product ID")]
    pub product_id: String,
    #[serde(rename = "Product Name")]
    pub name: String,
    #[serde(rename = "Price (Promo)")]
    pub promo_price: String,
    #[serde(rename = "Price (Original)")]
    pub original_price: String,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Reviews")]
    pub review_count: String,
    #[serde(rename = "Product URL")]
    pub product_url: String,
    /// One derived URL per color, in tile order.
    #[serde(rename = "Color Variant URLs", with = "variant_url_list")]
    pub variant_urls: Vec<String>,
    #[serde(rename = "Fetched At")]
    pub fetched_at: String,
}

impl ProductRecord {
    /// Numeric promo price, if the text holds one.
    pub fn promo_price_value(&self) -> Option<f64> {
        parse_price(&self.promo_price)
    }

    /// Numeric original price, if the text holds one.
    pub fn original_price_value(&self) -> Option<f64> {
        parse_price(&self.original_price)
    }

    /// Discount of the promo price against the original, in percent.
    pub fn discount_percent(&self) -> Option<f64> {
        discount_percent(self.promo_price_value(), self.original_price_value())
    }
}

/// Split a `|`-delimited variant URL list, trimming and dropping empties.
pub fn split_variant_urls(field: &str) -> Vec<String> {
    field
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

mod variant_url_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(urls: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&urls.join(super::VARIANT_URL_SEPARATOR))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let field = String::deserialize(d)?;
        Ok(super::split_variant_urls(&field))
    }
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

static PRICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*").expect("valid regex"));

/// Parse a displayed price such as `"19,90 €"` into `19.9`.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.replace('€', "").replace(',', ".");
    let cleaned = cleaned.trim();
    PRICE_NUMBER
        .find(cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// `(original - promo) / original * 100`, rounded to two decimals.
pub fn discount_percent(promo: Option<f64>, original: Option<f64>) -> Option<f64> {
    let (promo, original) = (promo?, original?);
    if original == 0.0 {
        return None;
    }
    Some(round2((original - promo) / original * 100.0))
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// VariantResult / EnrichmentSummary
// ---------------------------------------------------------------------------

/// Facts scraped from one color variant page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantResult {
    /// Selected color, when the color label was found.
    pub color: Option<String>,
    /// Available size labels, in picker order.
    pub sizes: Vec<String>,
}

impl VariantResult {
    /// `"COLOR: size1, size2"`, or `None` when the color or all sizes are missing.
    pub fn entry(&self) -> Option<String> {
        let color = self.color.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        if self.sizes.is_empty() {
            return None;
        }
        Some(format!("{color}: {}", self.sizes.join(", ")))
    }
}

/// Aggregate of all usable variant results for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSummary(String);

impl EnrichmentSummary {
    /// Join each usable variant as `"COLOR: sizes"` with `" | "`; falls back
    /// to [`UNAVAILABLE`] when none is usable.
    pub fn from_variants(variants: &[VariantResult]) -> Self {
        let entries: Vec<String> = variants.iter().filter_map(VariantResult::entry).collect();
        if entries.is_empty() {
            Self::unavailable()
        } else {
            Self(entries.join(" | "))
        }
    }

    pub fn unavailable() -> Self {
        Self(UNAVAILABLE.to_string())
    }

    /// Wrap a persisted summary; the empty string is the unenriched placeholder.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unavailable(&self) -> bool {
        self.0.eq_ignore_ascii_case(UNAVAILABLE)
    }

    /// `(color, sizes)` per variant block. Blocks without a color keep their
    /// sizes under an empty color.
    pub fn blocks(&self) -> Vec<(String, Vec<String>)> {
        if self.is_unavailable() {
            return Vec::new();
        }
        self.0
            .split('|')
            .filter_map(|block| {
                let block = block.trim();
                if block.is_empty() {
                    return None;
                }
                let (color, sizes) = match block.split_once(':') {
                    Some((color, sizes)) => (color.trim(), sizes),
                    None => ("", block),
                };
                let sizes = sizes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                Some((color.to_string(), sizes))
            })
            .collect()
    }

    /// Every size across all blocks, whitespace-normalized and upper-cased.
    pub fn sizes(&self) -> BTreeSet<String> {
        self.blocks()
            .into_iter()
            .flat_map(|(_, sizes)| sizes)
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase())
            .collect()
    }
}

impl std::fmt::Display for EnrichmentSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// EnrichedRecord
// ---------------------------------------------------------------------------

/// A product row of the enriched table: the extracted columns with
/// `Color Variant URLs` replaced by `Available Sizes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(rename = "Product ID")]
    pub product_id: String,
    #[serde(rename = "Product Name")]
    pub name: String,
    #[serde(rename = "Price (Promo)")]
    pub promo_price: String,
    #[serde(rename = "Price (Original)")]
    pub original_price: String,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Reviews")]
    pub review_count: String,
    #[serde(rename = "Product URL")]
    pub product_url: String,
    /// `None` until the record has been crawled.
    #[serde(rename = "Available Sizes", with = "summary_field")]
    pub available_sizes: Option<EnrichmentSummary>,
    #[serde(rename = "Fetched At")]
    pub fetched_at: String,
}

impl EnrichedRecord {
    /// The row for `record` before it has been crawled.
    pub fn pending(record: &ProductRecord) -> Self {
        Self {
            product_id: record.product_id.clone(),
            name: record.name.clone(),
            promo_price: record.promo_price.clone(),
            original_price: record.original_price.clone(),
            rating: record.rating.clone(),
            review_count: record.review_count.clone(),
            product_url: record.product_url.clone(),
            available_sizes: None,
            fetched_at: record.fetched_at.clone(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.available_sizes.is_some()
    }

    pub fn discount_percent(&self) -> Option<f64> {
        discount_percent(parse_price(&self.promo_price), parse_price(&self.original_price))
    }
}

mod summary_field {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::EnrichmentSummary;

    pub fn serialize<S: Serializer>(
        summary: &Option<EnrichmentSummary>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.serialize_str(summary.as_ref().map(EnrichmentSummary::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<EnrichmentSummary>, D::Error> {
        let field = String::deserialize(d)?;
        Ok(EnrichmentSummary::parse(&field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn variant(color: Option<&str>, sizes: &[&str]) -> VariantResult {
        VariantResult {
            color: color.map(String::from),
            sizes: sizes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn snapshot_render_prefixes_marker() {
        let at = Utc.with_ymd_and_hms(2025, 5, 3, 14, 7, 9).unwrap();
        let snapshot = ListingSnapshot::new("<html></html>".into(), at);
        assert_eq!(
            snapshot.render(),
            "<!-- Fetched on 2025-05-03T14:07:09.000Z -->\n<html></html>"
        );
    }

    #[test]
    fn split_variant_urls_trims_and_drops_empties() {
        let urls = split_variant_urls(" https://a/1?c=09 | |https://a/1?c=31 |");
        assert_eq!(urls, vec!["https://a/1?c=09", "https://a/1?c=31"]);
        assert!(split_variant_urls("").is_empty());
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("19,90 €"), Some(19.9));
        assert_eq!(parse_price("€ 39.90"), Some(39.9));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("ab 9 €"), Some(9.0));
    }

    #[test]
    fn discount_rounds_to_two_places() {
        assert_eq!(discount_percent(Some(19.9), Some(39.9)), Some(50.13));
        assert_eq!(discount_percent(None, Some(39.9)), None);
        assert_eq!(discount_percent(Some(1.0), Some(0.0)), None);
    }

    #[test]
    fn summary_from_variants() {
        let summary = EnrichmentSummary::from_variants(&[
            variant(Some("BLACK"), &["S", "M"]),
            variant(Some("WHITE"), &[]),
            variant(None, &["L"]),
            variant(Some("NAVY"), &["XL"]),
        ]);
        assert_eq!(summary.as_str(), "BLACK: S, M | NAVY: XL");
    }

    #[test]
    fn summary_without_usable_variants_is_unavailable() {
        assert!(EnrichmentSummary::from_variants(&[]).is_unavailable());
        let summary = EnrichmentSummary::from_variants(&[variant(Some("  "), &["S"])]);
        assert_eq!(summary.as_str(), UNAVAILABLE);
    }

    #[test]
    fn summary_sizes_round_trip_from_text() {
        let summary = EnrichmentSummary::parse("BLACK: S, m | OFF WHITE: XL,  39-42").unwrap();
        let sizes: Vec<_> = summary.sizes().into_iter().collect();
        assert_eq!(sizes, vec!["39-42", "M", "S", "XL"]);
        assert_eq!(summary.blocks()[1].0, "OFF WHITE");

        assert!(EnrichmentSummary::parse("").is_none());
        assert!(EnrichmentSummary::parse("Unavailable").unwrap().sizes().is_empty());
    }
}
