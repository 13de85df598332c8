//! Checkpointing of the enrichment working table.

use std::path::{Path, PathBuf};

use tracing::debug;

use rackscan_shared::{EnrichedRecord, RackscanError, Result};

use crate::to_csv_bytes;

/// Destination of full-table checkpoints.
///
/// `persist` receives the entire working table every time and must either
/// replace the previous checkpoint completely or leave it untouched.
pub trait CheckpointSink {
    fn persist(&mut self, rows: &[EnrichedRecord]) -> Result<()>;
}

/// Checkpoints the enriched table to a CSV file by write-then-rename.
#[derive(Debug, Clone)]
pub struct CsvCheckpoint {
    path: PathBuf,
    writes: usize,
}

impl CsvCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of checkpoints written so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl CheckpointSink for CsvCheckpoint {
    fn persist(&mut self, rows: &[EnrichedRecord]) -> Result<()> {
        let bytes = to_csv_bytes(rows)?;
        write_atomic(&self.path, &bytes)?;
        self.writes += 1;
        debug!(
            path = %self.path.display(),
            rows = rows.len(),
            bytes = bytes.len(),
            "checkpoint written"
        );
        Ok(())
    }
}

/// Write `content` to a sibling temp file, then rename it over `target`.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| RackscanError::io(parent, e))?;

    let file_name = target
        .file_name()
        .ok_or_else(|| RackscanError::validation(format!("not a file path: {}", target.display())))?
        .to_string_lossy();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| RackscanError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| RackscanError::io(target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_enriched;
    use rackscan_shared::{EnrichmentSummary, ProductRecord};
    use uuid::Uuid;

    fn pending(id: &str) -> EnrichedRecord {
        EnrichedRecord::pending(&ProductRecord {
            product_id: id.into(),
            name: format!("Item {id}"),
            promo_price: "9,90 €".into(),
            original_price: String::new(),
            rating: String::new(),
            review_count: String::new(),
            product_url: String::new(),
            variant_urls: vec![],
            fetched_at: "Unknown".into(),
        })
    }

    #[test]
    fn each_persist_replaces_the_whole_table() {
        let dir = std::env::temp_dir().join(format!("rackscan-ckpt-{}", Uuid::now_v7()));
        let mut sink = CsvCheckpoint::new(dir.join("out.csv"));
        let mut rows = vec![pending("1"), pending("2"), pending("3")];

        sink.persist(&rows).unwrap();
        rows[0].available_sizes = Some(EnrichmentSummary::unavailable());
        sink.persist(&rows).unwrap();

        let persisted = read_enriched(sink.path()).unwrap();
        assert_eq!(persisted.len(), 3);
        assert!(persisted[0].is_finalized());
        assert!(!persisted[1].is_finalized());
        assert_eq!(sink.writes(), 2);

        // No temp file is left behind.
        assert!(!dir.join(".out.csv.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
