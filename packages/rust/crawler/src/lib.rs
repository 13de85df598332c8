//! Browser-driven crawling of the sale listing and its product pages.
//!
//! - [`loader`] scrolls a progressively loading listing until the tile count
//!   converges, then captures a [`ListingSnapshot`](rackscan_shared::ListingSnapshot).
//! - [`enrich`] visits every color variant of the first N products and
//!   records size availability, checkpointing after every product.
//!
//! Both only depend on the [`Browser`](rackscan_browser::Browser) and
//! [`Page`](rackscan_browser::Page) traits.

pub mod consent;
pub mod enrich;
pub mod loader;
pub mod observer;
pub mod variant;

#[cfg(test)]
mod testing;

pub use consent::{ConsentOutcome, dismiss_consent};
pub use enrich::{EnrichOptions, EnrichReport, EnrichmentCrawler, EnrichmentState};
pub use loader::{ConvergenceState, ConvergenceTracker, ListingLoader, LoadOutcome, LoadedListing};
pub use observer::{CrawlObserver, NoopObserver};
pub use variant::{VariantScraper, parse_color_line, parse_size_label};
