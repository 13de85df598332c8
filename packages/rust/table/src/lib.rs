//! Tabular storage for product tables.
//!
//! UTF-8, comma-separated, every field double-quoted, fixed header row.
//! Full-table writes go through a temp file and a rename so a reader never
//! observes a truncated table.

mod checkpoint;

use std::fs::OpenOptions;
use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use rackscan_shared::{EnrichedRecord, ProductRecord, RackscanError, Result};

pub use checkpoint::{CheckpointSink, CsvCheckpoint, write_atomic};

/// Header of the extracted table.
pub const PRODUCT_HEADERS: &[&str] = &[
    "Product ID",
    "Product Name",
    "Price (Promo)",
    "Price (Original)",
    "Rating",
    "Reviews",
    "Product URL",
    "Color Variant URLs",
    "Fetched At",
];

/// Header of the enriched table.
pub const ENRICHED_HEADERS: &[&str] = &[
    "Product ID",
    "Product Name",
    "Price (Promo)",
    "Price (Original)",
    "Rating",
    "Reviews",
    "Product URL",
    "Available Sizes",
    "Fetched At",
];

/// A row type with a fixed column layout.
pub trait TableRow: Serialize + DeserializeOwned {
    /// Column names, in serialization order.
    const HEADERS: &'static [&'static str];
}

impl TableRow for ProductRecord {
    const HEADERS: &'static [&'static str] = PRODUCT_HEADERS;
}

impl TableRow for EnrichedRecord {
    const HEADERS: &'static [&'static str] = ENRICHED_HEADERS;
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read every row of the table at `path`. Columns are matched by name;
/// extra columns are ignored, missing ones are an error.
pub fn read_rows<T: TableRow>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| table_error(path, e))?;

    let headers = reader.headers().map_err(|e| table_error(path, e))?.clone();
    if let Some(missing) = T::HEADERS
        .iter()
        .find(|col| !headers.iter().any(|h| h.trim_start_matches('\u{feff}') == **col))
    {
        return Err(RackscanError::validation(format!(
            "{}: missing column \"{missing}\"",
            path.display()
        )));
    }

    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| table_error(path, e))?;

    debug!(path = %path.display(), rows = rows.len(), "read table");
    Ok(rows)
}

pub fn read_products(path: &Path) -> Result<Vec<ProductRecord>> {
    read_rows(path)
}

pub fn read_enriched(path: &Path) -> Result<Vec<EnrichedRecord>> {
    read_rows(path)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize `rows` (with header) into the on-disk representation.
pub fn to_csv_bytes<T: TableRow>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer
        .write_record(T::HEADERS)
        .map_err(|e| RackscanError::Table(e.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| RackscanError::Table(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| RackscanError::Table(e.to_string()))
}

/// Replace the table at `path` with `rows`.
pub fn write_rows<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    let bytes = to_csv_bytes(rows)?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}

pub fn write_products(path: &Path, rows: &[ProductRecord]) -> Result<()> {
    write_rows(path, rows)
}

pub fn write_enriched(path: &Path, rows: &[EnrichedRecord]) -> Result<()> {
    write_rows(path, rows)
}

/// Append `rows` to a history table, writing the header only when the file
/// is created. Returns the number of rows appended.
pub fn append_history<T: TableRow>(path: &Path, rows: &[T]) -> Result<usize> {
    let exists = path.exists();
    if !exists {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RackscanError::io(parent, e))?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RackscanError::io(path, e))?;

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_writer(file);

    if !exists {
        writer
            .write_record(T::HEADERS)
            .map_err(|e| table_error(path, e))?;
    }
    for row in rows {
        writer.serialize(row).map_err(|e| table_error(path, e))?;
    }
    writer.flush().map_err(|e| RackscanError::io(path, e))?;

    if exists {
        info!(path = %path.display(), rows = rows.len(), "appended to history");
    } else {
        info!(path = %path.display(), rows = rows.len(), "created history");
    }
    Ok(rows.len())
}

fn table_error(path: &Path, e: csv::Error) -> RackscanError {
    RackscanError::Table(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackscan_shared::EnrichmentSummary;
    use uuid::Uuid;

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rackscan-table-{}", Uuid::now_v7()))
    }

    fn record(id: &str, urls: &[&str]) -> ProductRecord {
        ProductRecord {
            product_id: id.into(),
            name: "Tee".into(),
            promo_price: "9,90 €".into(),
            original_price: "19,90 €".into(),
            rating: "4.5".into(),
            review_count: "12".into(),
            product_url: format!("https://shop.example.com/products/{id}"),
            variant_urls: urls.iter().map(|s| s.to_string()).collect(),
            fetched_at: "2025-05-03T14:07:09.000Z".into(),
        }
    }

    #[test]
    fn every_field_is_quoted() {
        let bytes = to_csv_bytes(&[record("E1", &["u1", "u2"])]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""Product ID","Product Name","Price (Promo)","Price (Original)","Rating","Reviews","Product URL","Color Variant URLs","Fetched At""#
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""E1","Tee","9,90 €","19,90 €","4.5","12","https://shop.example.com/products/E1","u1 | u2","2025-05-03T14:07:09.000Z""#
        );
    }

    #[test]
    fn empty_table_still_has_header() {
        let bytes = to_csv_bytes::<EnrichedRecord>(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"Available Sizes\""));
    }

    #[test]
    fn products_read_back_with_split_urls() {
        let dir = temp_dir();
        let path = dir.join("products.csv");
        write_products(&path, &[record("E1", &["u1", "u2"]), record("E2", &[])]).unwrap();

        let rows = read_products(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].variant_urls, vec!["u1", "u2"]);
        assert!(rows[1].variant_urls.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn enriched_placeholder_is_empty_field() {
        let dir = temp_dir();
        let path = dir.join("enriched.csv");
        let mut done = EnrichedRecord::pending(&record("E1", &[]));
        done.available_sizes = EnrichmentSummary::parse("BLACK: S, M");
        let pending = EnrichedRecord::pending(&record("E2", &[]));
        write_enriched(&path, &[done, pending]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#""https://shop.example.com/products/E2","","#));

        let rows = read_enriched(&path).unwrap();
        assert_eq!(rows[0].available_sizes.as_ref().unwrap().as_str(), "BLACK: S, M");
        assert!(!rows[1].is_finalized());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_column_is_rejected() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.csv");
        std::fs::write(&path, "\"Product ID\",\"Product Name\"\n\"E1\",\"Tee\"\n").unwrap();

        let err = read_products(&path).unwrap_err();
        assert!(err.to_string().contains("missing column"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn history_header_written_once() {
        let dir = temp_dir();
        let path = dir.join("history.csv");
        append_history(&path, &[record("E1", &[])]).unwrap();
        append_history(&path, &[record("E2", &[]), record("E3", &[])]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("\"Product ID\"").count(), 1);
        assert_eq!(read_products(&path).unwrap().len(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
