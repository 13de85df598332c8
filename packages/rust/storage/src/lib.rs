//! libSQL price-history database.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! product, one per (product, color, size) variant, and a time series of
//! price points per variant. [`Storage::sync_enriched`] ingests an enriched
//! table; re-syncing the same table inserts nothing new.

mod migrations;
mod sync;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::info;
use uuid::Uuid;

use rackscan_shared::{RackscanError, Result};

pub use sync::{Gender, PricePoint, SyncReport, row_hash};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// A product as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub gender: String,
    pub product_url: String,
}

/// A color/size variant as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVariant {
    pub id: String,
    pub color: String,
    pub size: String,
    pub variant_url: String,
    pub last_seen_at: Option<String>,
}

/// One price point joined with its variant.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistoryRow {
    pub color: String,
    pub size: String,
    pub point: PricePoint,
}

/// Outcome of an upsert keyed by a natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub id: String,
    pub created: bool,
    /// The stored row was changed.
    pub updated: bool,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RackscanError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RackscanError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 on a fresh database.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Products
    // -----------------------------------------------------------------------

    /// Insert a product, or rename it when the stored name differs.
    pub async fn upsert_product(
        &self,
        product_id: &str,
        name: &str,
        gender: Gender,
        product_url: &str,
    ) -> Result<Upserted> {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.get_product(product_id).await? {
            let updated = existing.name != name;
            if updated {
                self.conn
                    .execute(
                        "UPDATE products SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![name, now.as_str(), existing.id.as_str()],
                    )
                    .await
                    .map_err(storage_err)?;
            }
            return Ok(Upserted {
                id: existing.id,
                created: false,
                updated,
            });
        }

        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO products (id, product_id, name, gender, product_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    product_id,
                    name,
                    gender.as_str(),
                    product_url,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(Upserted {
            id,
            created: true,
            updated: false,
        })
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Option<StoredProduct>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, product_id, name, gender, product_url FROM products WHERE product_id = ?1",
                params![product_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(StoredProduct {
                id: row.get::<String>(0).map_err(storage_err)?,
                product_id: row.get::<String>(1).map_err(storage_err)?,
                name: row.get::<String>(2).map_err(storage_err)?,
                gender: row.get::<String>(3).map_err(storage_err)?,
                product_url: row.get::<String>(4).map_err(storage_err)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Variants
    // -----------------------------------------------------------------------

    /// Find or create the (product, color, size) variant and mark it seen.
    pub async fn ensure_variant(
        &self,
        product_ref: &str,
        color: &str,
        size: &str,
        variant_url: &str,
        seen_at: &str,
    ) -> Result<Upserted> {
        let existing = {
            let mut rows = self
                .conn
                .query(
                    "SELECT id, last_seen_at FROM variants WHERE product_ref = ?1 AND color = ?2 AND size = ?3",
                    params![product_ref, color, size],
                )
                .await
                .map_err(storage_err)?;
            match rows.next().await {
                Ok(Some(row)) => Some((
                    row.get::<String>(0).map_err(storage_err)?,
                    row.get::<String>(1).ok(),
                )),
                Ok(None) => None,
                Err(e) => return Err(storage_err(e)),
            }
        };

        if let Some((id, last_seen)) = existing {
            let updated = last_seen.as_deref() != Some(seen_at);
            if updated {
                self.conn
                    .execute(
                        "UPDATE variants SET last_seen_at = ?1 WHERE id = ?2",
                        params![seen_at, id.as_str()],
                    )
                    .await
                    .map_err(storage_err)?;
            }
            return Ok(Upserted {
                id,
                created: false,
                updated,
            });
        }

        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO variants (id, product_ref, color, size, variant_url, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    product_ref,
                    color,
                    size,
                    variant_url,
                    Utc::now().to_rfc3339(),
                    seen_at
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(Upserted {
            id,
            created: true,
            updated: false,
        })
    }

    /// Variants of a product, ordered by color then size.
    pub async fn list_variants(&self, product_id: &str) -> Result<Vec<StoredVariant>> {
        let mut rows = self
            .conn
            .query(
                "SELECT v.id, v.color, v.size, v.variant_url, v.last_seen_at
                 FROM variants v JOIN products p ON p.id = v.product_ref
                 WHERE p.product_id = ?1 ORDER BY v.color, v.size",
                params![product_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(StoredVariant {
                id: row.get::<String>(0).map_err(storage_err)?,
                color: row.get::<String>(1).map_err(storage_err)?,
                size: row.get::<String>(2).map_err(storage_err)?,
                variant_url: row.get::<String>(3).map_err(storage_err)?,
                last_seen_at: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Price points
    // -----------------------------------------------------------------------

    /// Insert a price point unless one with the same `row_hash` exists.
    /// Returns whether a row was inserted.
    pub async fn insert_price_point(
        &self,
        variant_ref: &str,
        point: &PricePoint,
        row_hash: &str,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO price_points
                   (variant_ref, promo_price, original_price, rating, reviews, discount_percent, fetched_at, row_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    variant_ref,
                    point.promo_price,
                    point.original_price,
                    point.rating,
                    point.reviews,
                    point.discount_percent,
                    point.fetched_at.as_str(),
                    row_hash
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Price points of a product, oldest first.
    pub async fn price_history(&self, product_id: &str) -> Result<Vec<PriceHistoryRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT v.color, v.size, pp.promo_price, pp.original_price, pp.rating,
                        pp.reviews, pp.discount_percent, pp.fetched_at
                 FROM price_points pp
                 JOIN variants v ON v.id = pp.variant_ref
                 JOIN products p ON p.id = v.product_ref
                 WHERE p.product_id = ?1
                 ORDER BY pp.fetched_at, v.color, v.size",
                params![product_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(PriceHistoryRow {
                color: row.get::<String>(0).map_err(storage_err)?,
                size: row.get::<String>(1).map_err(storage_err)?,
                point: PricePoint {
                    promo_price: row.get::<f64>(2).ok(),
                    original_price: row.get::<f64>(3).ok(),
                    rating: row.get::<f64>(4).ok(),
                    reviews: row.get::<i64>(5).ok(),
                    discount_percent: row.get::<f64>(6).ok(),
                    fetched_at: row.get::<String>(7).map_err(storage_err)?,
                },
            });
        }
        Ok(results)
    }

    pub async fn count_price_points(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM price_points", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }
}

fn storage_err(e: libsql::Error) -> RackscanError {
    RackscanError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rackscan_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("rackscan_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.schema_version().await, 2);
    }

    #[tokio::test]
    async fn product_upsert_renames() {
        let storage = test_storage().await;
        let url = "https://www.uniqlo.com/de/de/products/E1/00";

        let first = storage
            .upsert_product("E1", "Tee", Gender::Woman, url)
            .await
            .unwrap();
        assert!(first.created);

        let same = storage
            .upsert_product("E1", "Tee", Gender::Woman, url)
            .await
            .unwrap();
        assert_eq!(same.id, first.id);
        assert!(!same.created && !same.updated);

        let renamed = storage
            .upsert_product("E1", "Tee (Relaxed)", Gender::Woman, url)
            .await
            .unwrap();
        assert!(renamed.updated);
        let stored = storage.get_product("E1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Tee (Relaxed)");
        assert_eq!(stored.gender, "woman");
    }

    #[tokio::test]
    async fn variant_unique_per_triple() {
        let storage = test_storage().await;
        let product = storage
            .upsert_product("E2", "Jeans", Gender::Man, "u")
            .await
            .unwrap();

        let a = storage
            .ensure_variant(&product.id, "BLUE", "30INCH", "u", "2025-05-01T00:00:00.000Z")
            .await
            .unwrap();
        let b = storage
            .ensure_variant(&product.id, "BLUE", "30INCH", "u", "2025-05-02T00:00:00.000Z")
            .await
            .unwrap();
        assert!(a.created);
        assert_eq!(a.id, b.id);
        assert!(b.updated);

        let variants = storage.list_variants("E2").await.unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].last_seen_at.as_deref(), Some("2025-05-02T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn duplicate_price_point_is_ignored() {
        let storage = test_storage().await;
        let product = storage
            .upsert_product("E3", "Socks", Gender::Unknown, "u")
            .await
            .unwrap();
        let variant = storage
            .ensure_variant(&product.id, "GREY", "39-42", "u", "t")
            .await
            .unwrap();
        let point = PricePoint {
            promo_price: Some(4.9),
            original_price: Some(9.9),
            rating: None,
            reviews: Some(0),
            discount_percent: Some(50.51),
            fetched_at: "2025-05-03T14:07:09.123Z".into(),
        };

        assert!(storage.insert_price_point(&variant.id, &point, "h1").await.unwrap());
        assert!(!storage.insert_price_point(&variant.id, &point, "h1").await.unwrap());
        assert_eq!(storage.count_price_points().await.unwrap(), 1);

        let history = storage.price_history("E3").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].point, point);
    }
}
