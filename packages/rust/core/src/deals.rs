//! Deal scoring over the extracted table.
//!
//! Every row gets a discount, a review score, and the percentile rank of
//! both within the table; the pair of ranks decides an [`Action`]. Rows
//! classified as worth watching form the shortlist fed to enrichment.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use rackscan_shared::{AppConfig, ProductRecord, RackscanError, Result, round2};
use rackscan_table::{TableRow, append_history, read_products, write_atomic, write_products, write_rows};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Recommendation derived from the review-score and discount ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "SUPER")]
    Super,
    #[serde(rename = "WAIT FOR SALE")]
    WaitForSale,
    #[serde(rename = "GOOD DEAL")]
    GoodDeal,
    #[serde(rename = "DECENT")]
    Decent,
    #[serde(rename = "CHEAP UPPER MID")]
    CheapUpperMid,
    #[serde(rename = "CHEAP BUT MID")]
    CheapButMid,
    #[serde(rename = "AVOID")]
    Avoid,
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

impl Action {
    /// Classify by review-score rank `r` and discount rank `d`; first match wins.
    pub fn classify(r: f64, d: f64) -> Self {
        if r >= 0.9 && d >= 0.8 {
            Self::Super
        } else if r >= 0.9 && (0.5..0.8).contains(&d) {
            Self::WaitForSale
        } else if r >= 0.8 && d >= 0.8 {
            Self::GoodDeal
        } else if r >= 0.8 && (0.4..0.8).contains(&d) {
            Self::Decent
        } else if (0.7..0.8).contains(&r) && d >= 0.8 {
            Self::CheapUpperMid
        } else if r < 0.5 && d >= 0.9 {
            Self::CheapButMid
        } else if r < 0.3 && d < 0.3 {
            Self::Avoid
        } else {
            Self::Neutral
        }
    }

    /// Actions whose products are shortlisted.
    pub fn is_selected(self) -> bool {
        matches!(self, Self::Super | Self::GoodDeal | Self::CheapUpperMid)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Super => "SUPER",
            Self::WaitForSale => "WAIT FOR SALE",
            Self::GoodDeal => "GOOD DEAL",
            Self::Decent => "DECENT",
            Self::CheapUpperMid => "CHEAP UPPER MID",
            Self::CheapButMid => "CHEAP BUT MID",
            Self::Avoid => "AVOID",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// ScoredRow
// ---------------------------------------------------------------------------

/// Header of the scored table: the extracted columns, then the metrics.
pub const SCORED_HEADERS: &[&str] = &[
    "Product ID",
    "Product Name",
    "Price (Promo)",
    "Price (Original)",
    "Rating",
    "Reviews",
    "Product URL",
    "Color Variant URLs",
    "Fetched At",
    "Promo Price",
    "Original Price",
    "Discount %",
    "Review Score",
    "Review Score Quantile",
    "Discount Quantile",
    "Action",
];

/// An extracted row with its deal metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    #[serde(rename = "Product ID")]
    pub product_id: String,
    #[serde(rename = "Product Name")]
    pub name: String,
    #[serde(rename = "Price (Promo)")]
    pub promo_price_text: String,
    #[serde(rename = "Price (Original)")]
    pub original_price_text: String,
    #[serde(rename = "Rating")]
    pub rating: f64,
    #[serde(rename = "Reviews")]
    pub reviews: u64,
    #[serde(rename = "Product URL")]
    pub product_url: String,
    #[serde(rename = "Color Variant URLs")]
    pub variant_urls: String,
    #[serde(rename = "Fetched At")]
    pub fetched_at: String,
    #[serde(rename = "Promo Price")]
    pub promo_price: f64,
    #[serde(rename = "Original Price")]
    pub original_price: f64,
    #[serde(rename = "Discount %")]
    pub discount_percent: f64,
    #[serde(rename = "Review Score")]
    pub review_score: f64,
    #[serde(rename = "Review Score Quantile")]
    pub review_score_quantile: f64,
    #[serde(rename = "Discount Quantile")]
    pub discount_quantile: f64,
    #[serde(rename = "Action")]
    pub action: Action,
}

impl TableRow for ScoredRow {
    const HEADERS: &'static [&'static str] = SCORED_HEADERS;
}

/// Numeric review count: digits only, missing means zero.
fn review_count(text: &str) -> u64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Numeric rating: missing means zero, anything unparseable is `None`.
fn rating(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        Some(0.0)
    } else {
        text.parse().ok().filter(|r: &f64| r.is_finite())
    }
}

/// `rating * log10(reviews + 1)`, rounded to two decimals.
pub fn review_score(rating: f64, reviews: u64) -> f64 {
    round2(rating * ((reviews + 1) as f64).log10())
}

/// Percentile rank of each value: average rank of ties, divided by the count.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // 1-based average rank of the tie group.
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank / n as f64;
        }
        start = end + 1;
    }
    ranks
}

/// Score every usable row. Rows without a computable discount or with a
/// non-numeric rating are dropped.
pub fn score(records: &[ProductRecord]) -> Vec<ScoredRow> {
    struct Base<'a> {
        record: &'a ProductRecord,
        rating: f64,
        reviews: u64,
        promo: f64,
        original: f64,
        discount: f64,
        review_score: f64,
    }

    let bases: Vec<Base<'_>> = records
        .iter()
        .filter_map(|record| {
            let promo = record.promo_price_value()?;
            let original = record.original_price_value()?;
            let discount = record.discount_percent()?;
            let rating = rating(&record.rating)?;
            let reviews = review_count(&record.review_count);
            Some(Base {
                record,
                rating,
                reviews,
                promo,
                original,
                discount,
                review_score: review_score(rating, reviews),
            })
        })
        .collect();

    let dropped = records.len() - bases.len();
    if dropped > 0 {
        debug!(dropped, "rows without usable price or rating");
    }

    let review_ranks = percentile_ranks(&bases.iter().map(|b| b.review_score).collect::<Vec<_>>());
    let discount_ranks = percentile_ranks(&bases.iter().map(|b| b.discount).collect::<Vec<_>>());

    bases
        .into_iter()
        .zip(review_ranks.into_iter().zip(discount_ranks))
        .map(|(base, (r, d))| {
            let (r, d) = (round2(r), round2(d));
            ScoredRow {
                product_id: base.record.product_id.clone(),
                name: base.record.name.clone(),
                promo_price_text: base.record.promo_price.clone(),
                original_price_text: base.record.original_price.clone(),
                rating: base.rating,
                reviews: base.reviews,
                product_url: base.record.product_url.clone(),
                variant_urls: base.record.variant_urls.join(" | "),
                fetched_at: base.record.fetched_at.clone(),
                promo_price: base.promo,
                original_price: base.original,
                discount_percent: base.discount,
                review_score: base.review_score,
                review_score_quantile: r,
                discount_quantile: d,
                action: Action::classify(r, d),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Ids marked `true` in a `{ "<id>": true }` blocklist. A missing file is empty.
pub fn load_blocklist(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| RackscanError::io(path, e))?;
    let entries: HashMap<String, serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| RackscanError::parse(format!("{}: {e}", path.display())))?;
    Ok(entries
        .into_iter()
        .filter(|(_, v)| v.as_bool() == Some(true))
        .map(|(id, _)| id)
        .collect())
}

/// One id per non-blank line. A missing file is empty.
pub fn load_ids(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| RackscanError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub fn write_ids(path: &Path, ids: &BTreeSet<String>) -> Result<()> {
    let mut content = String::new();
    for id in ids {
        content.push_str(id);
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())
}

/// Selected ids of `scored` minus `blocked`.
pub fn select_ids(scored: &[ScoredRow], blocked: &HashSet<String>) -> BTreeSet<String> {
    scored
        .iter()
        .filter(|row| row.action.is_selected())
        .map(|row| row.product_id.trim())
        .filter(|id| !id.is_empty() && !blocked.contains(*id))
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// File locations used by [`run_deals`].
#[derive(Debug, Clone)]
pub struct DealsPaths {
    pub input: PathBuf,
    pub scored: PathBuf,
    pub shortlist: PathBuf,
    pub ids: PathBuf,
    pub blocklist: PathBuf,
    pub history: PathBuf,
}

impl From<&AppConfig> for DealsPaths {
    fn from(config: &AppConfig) -> Self {
        let paths = &config.paths;
        Self {
            input: paths.products(),
            scored: paths.scored(),
            shortlist: paths.shortlist(),
            ids: paths.ids(),
            blocklist: paths.blocklist(),
            history: paths.scored_history(),
        }
    }
}

/// Summary of a deals run.
#[derive(Debug, Clone, Default)]
pub struct DealsReport {
    pub input_rows: usize,
    pub scored_rows: usize,
    /// Newly selected ids after the blocklist.
    pub selected: usize,
    pub blocked: usize,
    /// Size of the accumulated target-id set.
    pub target_ids: usize,
    pub shortlisted: usize,
    pub actions: BTreeMap<Action, usize>,
}

/// Score the extracted table, update the target ids, and write the shortlist.
#[instrument(skip_all, fields(input = %paths.input.display()))]
pub fn run_deals(paths: &DealsPaths) -> Result<DealsReport> {
    let records = read_products(&paths.input)?;
    let scored = score(&records);

    let blocked = load_blocklist(&paths.blocklist)?;
    let selected = select_ids(&scored, &blocked);
    let blocked_hits = scored
        .iter()
        .filter(|r| r.action.is_selected() && blocked.contains(r.product_id.trim()))
        .count();

    let mut target = load_ids(&paths.ids)?;
    target.extend(selected.iter().cloned());
    write_ids(&paths.ids, &target)?;

    write_rows(&paths.scored, &scored)?;
    append_history(&paths.history, &scored)?;

    let shortlist: Vec<ProductRecord> = records
        .iter()
        .filter(|r| target.contains(r.product_id.trim()))
        .cloned()
        .collect();
    write_products(&paths.shortlist, &shortlist)?;
    if shortlist.is_empty() {
        warn!("no product qualified for the shortlist");
    }

    let mut actions = BTreeMap::new();
    for row in &scored {
        *actions.entry(row.action).or_insert(0) += 1;
    }

    let report = DealsReport {
        input_rows: records.len(),
        scored_rows: scored.len(),
        selected: selected.len(),
        blocked: blocked_hits,
        target_ids: target.len(),
        shortlisted: shortlist.len(),
        actions,
    };
    info!(
        scored = report.scored_rows,
        selected = report.selected,
        target_ids = report.target_ids,
        shortlisted = report.shortlisted,
        "deals scored"
    );
    Ok(report)
}
