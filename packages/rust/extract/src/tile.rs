//! Field access for a single listing tile.

use scraper::{ElementRef, Selector};

use rackscan_shared::{RackscanError, Result};

/// The fixed selectors of the listing markup.
#[derive(Debug)]
pub(crate) struct TileSelectors {
    pub tile: Selector,
    name: Selector,
    promo_price: Selector,
    original_price: Selector,
    rating: Selector,
    reviews: Selector,
    product_link: Selector,
    tile_root: Selector,
    color_chip: Selector,
}

impl TileSelectors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tile: selector(".fr-ec-product-tile__end")?,
            name: selector(r#"[data-testid="CoreTitle"]"#)?,
            promo_price: selector(".fr-ec-price-text--middle")?,
            original_price: selector(".fr-ec-price__strike-through")?,
            rating: selector(".fr-ec-rating-average-product-tile")?,
            reviews: selector(".fr-ec-rating-static__count-product-tile")?,
            product_link: selector(r#"a[id][href*="/products/"]"#)?,
            tile_root: selector(".fr-ec-product-tile")?,
            color_chip: selector(r#"input[name="shortChipGroup"][aria-label]"#)?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| RackscanError::parse(format!("invalid selector `{css}`: {e}")))
}

/// Raw text fields of one tile, before URL synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TileFields {
    pub name: String,
    pub promo_price: String,
    pub original_price: String,
    pub rating: String,
    pub review_count: String,
    pub product_id: String,
    pub href: String,
    pub color_codes: Vec<String>,
}

impl TileFields {
    pub fn read(tile: ElementRef<'_>, sel: &TileSelectors) -> Self {
        let (product_id, href) = closest(tile, &sel.product_link)
            .map(|link| (attr(link, "id"), attr(link, "href")))
            .unwrap_or_default();

        let color_codes = closest(tile, &sel.tile_root)
            .map(|root| {
                root.select(&sel.color_chip)
                    .map(|chip| attr(chip, "aria-label"))
                    .filter(|code| !code.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: all_text(tile, &sel.name),
            promo_price: super::normalize_price(&first_text(tile, &sel.promo_price)),
            original_price: super::normalize_price(&first_text(tile, &sel.original_price)),
            rating: first_text(tile, &sel.rating),
            review_count: first_text(tile, &sel.reviews).replace(['(', ')'], ""),
            product_id,
            href,
            color_codes,
        }
    }

    /// A tile becomes a record only with a name and at least one price.
    pub fn is_listable(&self) -> bool {
        !self.name.is_empty() && (!self.promo_price.is_empty() || !self.original_price.is_empty())
    }
}

/// Nearest element, starting at `el` itself, that matches `selector`.
fn closest<'a>(el: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::successors(Some(el), |e| e.parent().and_then(ElementRef::wrap))
        .find(|e| selector.matches(e))
}

fn attr(el: ElementRef<'_>, name: &str) -> String {
    el.value().attr(name).unwrap_or_default().trim().to_string()
}

/// Concatenated text of every match, trimmed.
fn all_text(el: ElementRef<'_>, selector: &Selector) -> String {
    el.select(selector)
        .flat_map(|m| m.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Text of the first match, trimmed.
fn first_text(el: ElementRef<'_>, selector: &Selector) -> String {
    el.select(selector)
        .next()
        .map(|m| m.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string()
}
