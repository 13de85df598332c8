//! Application configuration for rackscan.
//!
//! User config lives at `~/.rackscan/rackscan.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RackscanError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rackscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rackscan";

// ---------------------------------------------------------------------------
// Config structs (matching rackscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebDriver session settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Cookie-consent overlay handling.
    #[serde(default)]
    pub consent: ConsentConfig,

    /// Listing page convergence loading.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Product tile extraction.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Per-variant enrichment crawl.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Deal scoring and size filtering.
    #[serde(default)]
    pub deals: DealsConfig,

    /// Input/output file locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the WebDriver server (chromedriver, geckodriver).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// `browserName` capability.
    #[serde(default = "default_browser_name")]
    pub browser_name: String,

    /// Run without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// User-Agent presented by every page of the session.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional browser command-line arguments.
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            headless: true,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
            extra_args: default_extra_args(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_browser_name() -> String {
    "chrome".into()
}
fn default_viewport_width() -> u32 {
    1400
}
fn default_viewport_height() -> u32 {
    1000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/122.0.0.0 Safari/537.36"
        .into()
}
fn default_extra_args() -> Vec<String> {
    vec!["--no-sandbox".into(), "--disable-setuid-sandbox".into()]
}
fn default_true() -> bool {
    true
}

/// `[consent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    /// Selector of the "accept" button on the consent overlay.
    #[serde(default = "default_consent_selector")]
    pub selector: String,

    /// How long to wait for the overlay to appear.
    #[serde(default = "default_consent_timeout")]
    pub timeout_ms: u64,

    /// Pause after clicking, letting the overlay animate away.
    #[serde(default = "default_consent_settle")]
    pub settle_ms: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            selector: default_consent_selector(),
            timeout_ms: default_consent_timeout(),
            settle_ms: default_consent_settle(),
        }
    }
}

impl ConsentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_consent_selector() -> String {
    "button#onetrust-accept-btn-handler".into()
}
fn default_consent_timeout() -> u64 {
    5_000
}
fn default_consent_settle() -> u64 {
    1_000
}

/// `[loader]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Listing page to load.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Selector matching one element per loaded product tile.
    #[serde(default = "default_item_selector")]
    pub item_selector: String,

    /// Consecutive unchanged measurements that count as converged.
    #[serde(default = "default_max_stable")]
    pub max_stable: u32,

    /// Hard cap on measure/scroll iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wait after each scroll before the next measurement.
    #[serde(default = "default_loader_settle")]
    pub settle_ms: u64,

    /// Bound on the initial listing navigation.
    #[serde(default = "default_listing_nav_timeout")]
    pub navigation_timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            item_selector: default_item_selector(),
            max_stable: default_max_stable(),
            max_iterations: default_max_iterations(),
            settle_ms: default_loader_settle(),
            navigation_timeout_ms: default_listing_nav_timeout(),
        }
    }
}

impl LoaderConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

fn default_listing_url() -> String {
    "https://www.uniqlo.com/de/de/feature/sale/women".into()
}
fn default_item_selector() -> String {
    r#"[data-testid="productTile"]"#.into()
}
fn default_max_stable() -> u32 {
    4
}
fn default_max_iterations() -> u32 {
    100
}
fn default_loader_settle() -> u64 {
    3_000
}
fn default_listing_nav_timeout() -> u64 {
    60_000
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Origin prepended to relative product links.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Query parameter selecting a color on the product page.
    #[serde(default = "default_color_param")]
    pub color_param: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            color_param: default_color_param(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.uniqlo.com".into()
}
fn default_color_param() -> String {
    "colorDisplayCode".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Number of leading records to enrich.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Bound on each variant page navigation.
    #[serde(default = "default_variant_nav_timeout")]
    pub navigation_timeout_ms: u64,

    /// Selector of the size inputs, each carrying an `aria-label`.
    #[serde(default = "default_size_picker_selector")]
    pub size_picker_selector: String,

    /// Bound on waiting for the size picker to render.
    #[serde(default = "default_size_picker_timeout")]
    pub size_picker_timeout_ms: u64,

    /// Text that starts the paragraph naming the selected color.
    #[serde(default = "default_color_label_prefix")]
    pub color_label_prefix: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            navigation_timeout_ms: default_variant_nav_timeout(),
            size_picker_selector: default_size_picker_selector(),
            size_picker_timeout_ms: default_size_picker_timeout(),
            color_label_prefix: default_color_label_prefix(),
        }
    }
}

impl EnrichmentConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn size_picker_timeout(&self) -> Duration {
        Duration::from_millis(self.size_picker_timeout_ms)
    }
}

fn default_limit() -> usize {
    100
}
fn default_variant_nav_timeout() -> u64 {
    20_000
}
fn default_size_picker_selector() -> String {
    "#product-size-picker input[aria-label]".into()
}
fn default_size_picker_timeout() -> u64 {
    10_000
}
fn default_color_label_prefix() -> String {
    "Farbe:".into()
}

/// `[deals]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealsConfig {
    /// Minimum discount for the size filter to keep a row.
    #[serde(default = "default_min_discount")]
    pub min_discount_percent: f64,

    /// Size labels the size filter looks for (case-insensitive).
    #[serde(default = "default_wanted_sizes")]
    pub wanted_sizes: Vec<String>,
}

impl Default for DealsConfig {
    fn default() -> Self {
        Self {
            min_discount_percent: default_min_discount(),
            wanted_sizes: default_wanted_sizes(),
        }
    }
}

fn default_min_discount() -> f64 {
    50.0
}
fn default_wanted_sizes() -> Vec<String> {
    ["M", "L", "XL", "26INCH", "27INCH", "28INCH", "29INCH", "39-42"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[paths]` section. File names are resolved against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    #[serde(default = "default_products_file")]
    pub products_file: String,
    #[serde(default = "default_scored_file")]
    pub scored_file: String,
    #[serde(default = "default_shortlist_file")]
    pub shortlist_file: String,
    #[serde(default = "default_enriched_file")]
    pub enriched_file: String,
    #[serde(default = "default_filtered_file")]
    pub filtered_file: String,
    #[serde(default = "default_ids_file")]
    pub ids_file: String,
    #[serde(default = "default_blocklist_file")]
    pub blocklist_file: String,
    #[serde(default = "default_scored_history_file")]
    pub scored_history_file: String,
    #[serde(default = "default_verified_history_file")]
    pub verified_history_file: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_file: default_snapshot_file(),
            products_file: default_products_file(),
            scored_file: default_scored_file(),
            shortlist_file: default_shortlist_file(),
            enriched_file: default_enriched_file(),
            filtered_file: default_filtered_file(),
            ids_file: default_ids_file(),
            blocklist_file: default_blocklist_file(),
            scored_history_file: default_scored_history_file(),
            verified_history_file: default_verified_history_file(),
            database_file: default_database_file(),
            report_file: default_report_file(),
        }
    }
}

impl PathsConfig {
    /// Resolve a configured file name against the data directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        Path::new(&self.data_dir).join(file)
    }

    pub fn snapshot(&self) -> PathBuf {
        self.resolve(&self.snapshot_file)
    }
    pub fn products(&self) -> PathBuf {
        self.resolve(&self.products_file)
    }
    pub fn scored(&self) -> PathBuf {
        self.resolve(&self.scored_file)
    }
    pub fn shortlist(&self) -> PathBuf {
        self.resolve(&self.shortlist_file)
    }
    pub fn enriched(&self) -> PathBuf {
        self.resolve(&self.enriched_file)
    }
    pub fn filtered(&self) -> PathBuf {
        self.resolve(&self.filtered_file)
    }
    pub fn ids(&self) -> PathBuf {
        self.resolve(&self.ids_file)
    }
    pub fn blocklist(&self) -> PathBuf {
        self.resolve(&self.blocklist_file)
    }
    pub fn scored_history(&self) -> PathBuf {
        self.resolve(&self.scored_history_file)
    }
    pub fn verified_history(&self) -> PathBuf {
        self.resolve(&self.verified_history_file)
    }
    pub fn database(&self) -> PathBuf {
        self.resolve(&self.database_file)
    }
    pub fn report(&self) -> PathBuf {
        self.resolve(&self.report_file)
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_snapshot_file() -> String {
    "listing-raw.html".into()
}
fn default_products_file() -> String {
    "products.csv".into()
}
fn default_scored_file() -> String {
    "products-scored.csv".into()
}
fn default_shortlist_file() -> String {
    "shortlist.csv".into()
}
fn default_enriched_file() -> String {
    "products-with-sizes.csv".into()
}
fn default_filtered_file() -> String {
    "products-with-sizes-filtered.csv".into()
}
fn default_ids_file() -> String {
    "target-ids.txt".into()
}
fn default_blocklist_file() -> String {
    "blocked-ids.json".into()
}
fn default_scored_history_file() -> String {
    "scored-history.csv".into()
}
fn default_verified_history_file() -> String {
    "verified-history.csv".into()
}
fn default_database_file() -> String {
    "history.db".into()
}
fn default_report_file() -> String {
    "report.html".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rackscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RackscanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rackscan/rackscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RackscanError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RackscanError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RackscanError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RackscanError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| RackscanError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("webdriver_url"));
        assert!(toml_str.contains("onetrust-accept-btn-handler"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[loader]
listing_url = "https://shop.example.com/sale"
max_stable = 2

[enrichment]
limit = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.loader.listing_url, "https://shop.example.com/sale");
        assert_eq!(config.loader.max_stable, 2);
        assert_eq!(config.loader.max_iterations, 100);
        assert_eq!(config.enrichment.limit, 5);
        assert_eq!(config.enrichment.color_label_prefix, "Farbe:");
        assert_eq!(config.browser.viewport_width, 1400);
    }

    #[test]
    fn paths_resolve_against_data_dir() {
        let paths = PathsConfig {
            data_dir: "/tmp/rackscan".into(),
            ..PathsConfig::default()
        };
        assert_eq!(
            paths.enriched(),
            PathBuf::from("/tmp/rackscan/products-with-sizes.csv")
        );
        assert_eq!(paths.snapshot(), PathBuf::from("/tmp/rackscan/listing-raw.html"));
        assert_eq!(paths.report(), PathBuf::from("/tmp/rackscan/report.html"));
    }

    #[test]
    fn durations_from_millis() {
        let enrichment = EnrichmentConfig::default();
        assert_eq!(enrichment.navigation_timeout(), Duration::from_secs(20));
        assert_eq!(enrichment.size_picker_timeout(), Duration::from_secs(10));
        assert_eq!(ConsentConfig::default().timeout(), Duration::from_secs(5));
    }

    #[test]
    fn init_config_writes_loadable_file() {
        let dir = std::env::temp_dir().join(format!(
            "rackscan-config-{}",
            std::process::id()
        ));
        let path = dir.join(CONFIG_FILE_NAME);
        init_config_at(&path).expect("init config");
        let loaded = load_config_from(&path).expect("load config");
        assert_eq!(loaded.deals.min_discount_percent, 50.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
