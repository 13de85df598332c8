//! Listing snapshot to product records.
//!
//! A pure, single-pass transformation of the captured listing document into
//! deduplicated [`ProductRecord`]s. Missing optional fields become empty
//! strings; only tiles with a name and at least one price are emitted.

mod tile;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use tracing::{debug, info, instrument};

use rackscan_shared::{ExtractConfig, FETCHED_AT_UNKNOWN, ProductRecord, Result};

use crate::tile::{TileFields, TileSelectors};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of extracting one listing document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Unique records in document order.
    pub records: Vec<ProductRecord>,
    /// Tiles found in the document.
    pub tiles: usize,
    /// Tiles without a name or any price.
    pub skipped: usize,
    /// Tiles identical to an earlier record in every field.
    pub duplicates: usize,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract every listable tile of `html`.
#[instrument(skip_all, fields(bytes = html.len()))]
pub fn extract(html: &str, config: &ExtractConfig) -> Result<Extraction> {
    let selectors = TileSelectors::new()?;
    let fetched_at = parse_fetched_at(html);
    let doc = Html::parse_document(html);

    let mut seen: HashSet<ProductRecord> = HashSet::new();
    let mut records = Vec::new();
    let mut tiles = 0;
    let mut skipped = 0;
    let mut duplicates = 0;

    for el in doc.select(&selectors.tile) {
        tiles += 1;
        let fields = TileFields::read(el, &selectors);
        if !fields.is_listable() {
            skipped += 1;
            continue;
        }

        let record = build_record(fields, config, &fetched_at);
        if seen.insert(record.clone()) {
            records.push(record);
        } else {
            duplicates += 1;
        }
    }

    debug!(tiles, skipped, duplicates, "tiles scanned");
    info!(records = records.len(), %fetched_at, "extracted listing");

    Ok(Extraction {
        records,
        tiles,
        skipped,
        duplicates,
    })
}

/// Convenience wrapper returning only the records.
pub fn extract_records(html: &str, config: &ExtractConfig) -> Result<Vec<ProductRecord>> {
    Ok(extract(html, config)?.records)
}

fn build_record(fields: TileFields, config: &ExtractConfig, fetched_at: &str) -> ProductRecord {
    let product_url = product_url(&config.base_url, &fields.href);
    let variant_urls = if product_url.is_empty() {
        Vec::new()
    } else {
        fields
            .color_codes
            .iter()
            .map(|code| variant_url(&product_url, &config.color_param, code))
            .collect()
    };

    ProductRecord {
        product_id: fields.product_id,
        name: fields.name,
        promo_price: fields.promo_price,
        original_price: fields.original_price,
        rating: fields.rating,
        review_count: fields.review_count,
        product_url,
        variant_urls,
        fetched_at: fetched_at.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Capture timestamp from the snapshot's provenance comment, or `"Unknown"`.
pub fn parse_fetched_at(html: &str) -> String {
    static FETCHED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<!--\s*Fetched on ([\d\-T:.Z]+)\s*-->").unwrap());

    FETCHED_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| FETCHED_AT_UNKNOWN.to_string())
}

/// Repair a mis-decoded euro sign (`" â‚¬"` becomes `"€"`).
pub fn normalize_price(text: &str) -> String {
    static MOJIBAKE_EURO_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*â‚¬").unwrap());

    MOJIBAKE_EURO_RE.replace_all(text, "€").into_owned()
}

/// Absolute product URL for a tile link; empty when the tile has none.
pub fn product_url(base_url: &str, href: &str) -> String {
    if href.is_empty() {
        String::new()
    } else if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{href}", base_url.trim_end_matches('/'))
    }
}

/// Product URL with the color selected through `param`.
pub fn variant_url(product_url: &str, param: &str, code: &str) -> String {
    let sep = if product_url.contains('?') { '&' } else { '?' };
    format!("{product_url}{sep}{param}={code}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_path(name: &str) -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/html")
            .join(name)
    }

    fn load_fixture(name: &str) -> String {
        fs::read_to_string(fixture_path(name))
            .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    fn listing() -> Extraction {
        extract(&load_fixture("listing.html"), &ExtractConfig::default()).unwrap()
    }

    #[test]
    fn fixture_yields_listable_unique_records() {
        let out = listing();
        assert_eq!(out.tiles, 8);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.records.len(), 5);
    }

    #[test]
    fn full_tile_fields() {
        let out = listing();
        let tee = &out.records[0];
        assert_eq!(tee.product_id, "E465185-000");
        assert_eq!(tee.name, "AIRism Baumwolle Oversized T-Shirt");
        assert_eq!(tee.promo_price, "9,90 €");
        assert_eq!(tee.original_price, "19,90 €");
        assert_eq!(tee.rating, "4.6");
        assert_eq!(tee.review_count, "152");
        assert_eq!(
            tee.product_url,
            "https://www.uniqlo.com/de/de/products/E465185-000/00"
        );
        assert_eq!(
            tee.variant_urls,
            vec![
                "https://www.uniqlo.com/de/de/products/E465185-000/00?colorDisplayCode=09",
                "https://www.uniqlo.com/de/de/products/E465185-000/00?colorDisplayCode=00",
            ]
        );
        assert_eq!(tee.fetched_at, "2025-05-03T14:07:09.123Z");
    }

    #[test]
    fn existing_query_gets_ampersand() {
        let jeans = &listing().records[1];
        assert_eq!(
            jeans.variant_urls,
            vec!["https://www.uniqlo.com/de/de/products/E470077-000/00?dpt=women&colorDisplayCode=69"]
        );
        assert_eq!(jeans.rating, "");
        assert_eq!(jeans.review_count, "");
    }

    #[test]
    fn same_id_with_different_price_is_kept() {
        let out = listing();
        let tees: Vec<_> = out
            .records
            .iter()
            .filter(|r| r.product_id == "E465185-000")
            .collect();
        assert_eq!(tees.len(), 2);
        assert_eq!(tees[1].promo_price, "7,90 €");
    }

    #[test]
    fn tile_without_link_has_empty_id_and_urls() {
        let card = &listing().records[3];
        assert_eq!(card.name, "Geschenkkarte");
        assert_eq!(card.product_id, "");
        assert_eq!(card.product_url, "");
        assert!(card.variant_urls.is_empty());
        assert_eq!(card.promo_price, "");
        assert_eq!(card.original_price, "25,00 €");
    }

    #[test]
    fn mojibake_euro_and_empty_chip_label() {
        let jacket = &listing().records[4];
        assert_eq!(jacket.promo_price, "29,90€");
        assert_eq!(jacket.original_price, "49,90€");
        assert_eq!(jacket.variant_urls.len(), 1);
        assert!(jacket.variant_urls[0].ends_with("colorDisplayCode=56"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = load_fixture("listing.html");
        let first = extract_records(&html, &ExtractConfig::default()).unwrap();
        let second = extract_records(&html, &ExtractConfig::default()).unwrap();
        assert_eq!(first, second);

        let unique: HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn missing_marker_is_unknown() {
        assert_eq!(parse_fetched_at("<html></html>"), "Unknown");
        assert_eq!(
            parse_fetched_at("<!--Fetched on 2025-01-02T03:04:05.006Z-->\n<html>"),
            "2025-01-02T03:04:05.006Z"
        );
    }

    #[test]
    fn absolute_href_is_kept() {
        assert_eq!(
            product_url("https://www.uniqlo.com", "https://other.example/products/1"),
            "https://other.example/products/1"
        );
        assert_eq!(product_url("https://www.uniqlo.com/", "/p/1"), "https://www.uniqlo.com/p/1");
        assert_eq!(product_url("https://www.uniqlo.com", ""), "");
    }

    #[test]
    fn empty_document_has_no_records() {
        let out = extract("", &ExtractConfig::default()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.tiles, 0);
    }
}
