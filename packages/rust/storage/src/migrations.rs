//! SQL migrations for the price-history database.
//!
//! Applied in ascending order on open; each records its version in
//! `schema_migrations`.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: products, variants, price_points",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    product_id  TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    gender      TEXT NOT NULL,
    product_url TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS variants (
    id          TEXT PRIMARY KEY,
    product_ref TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    color       TEXT NOT NULL,
    size        TEXT NOT NULL,
    variant_url TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(product_ref, color, size)
);

CREATE INDEX IF NOT EXISTS idx_variants_product ON variants(product_ref);

CREATE TABLE IF NOT EXISTS price_points (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    variant_ref      TEXT NOT NULL REFERENCES variants(id) ON DELETE CASCADE,
    promo_price      REAL,
    original_price   REAL,
    rating           REAL,
    reviews          INTEGER,
    discount_percent REAL,
    fetched_at       TEXT NOT NULL,
    row_hash         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_price_points_hash ON price_points(row_hash);
CREATE INDEX IF NOT EXISTS idx_price_points_variant ON price_points(variant_ref);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Per-variant availability history",
            sql: r#"
ALTER TABLE variants ADD COLUMN last_seen_at TEXT;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
