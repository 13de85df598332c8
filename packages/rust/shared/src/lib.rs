//! Shared types, error model, and configuration for rackscan.
//!
//! This crate is the foundation depended on by all other rackscan crates.
//! It provides:
//! - [`RackscanError`]: the unified error type
//! - Domain types ([`ProductRecord`], [`EnrichedRecord`], [`VariantResult`],
//!   [`EnrichmentSummary`], [`ListingSnapshot`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, ConsentConfig, DealsConfig, EnrichmentConfig, ExtractConfig,
    LoaderConfig, PathsConfig, config_dir, config_file_path, init_config, init_config_at,
    load_config, load_config_from,
};
pub use error::{RackscanError, Result};
pub use types::{
    EnrichedRecord, EnrichmentSummary, FETCHED_AT_UNKNOWN, ListingSnapshot, ProductRecord,
    UNAVAILABLE, VariantResult, discount_percent, parse_price, round2, split_variant_urls,
};
