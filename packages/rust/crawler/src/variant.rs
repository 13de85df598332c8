//! Scraping a single color-variant detail page.

use serde_json::Value;
use tracing::{debug, instrument};

use rackscan_browser::Page;
use rackscan_shared::{ConsentConfig, EnrichmentConfig, RackscanError, Result, VariantResult};

use crate::consent::dismiss_consent;

/// Returns the trimmed text of the first `<p>` starting with `arguments[0]`.
pub(crate) const COLOR_LINE_SCRIPT: &str = r#"
const prefix = arguments[0];
const hit = Array.from(document.querySelectorAll('p'))
  .find(p => (p.textContent || '').trim().startsWith(prefix));
return hit ? hit.textContent.trim() : null;
"#;

/// Returns the `aria-label` of every size option matching `arguments[0]`.
pub(crate) const SIZE_LABELS_SCRIPT: &str = r#"
return Array.from(document.querySelectorAll(arguments[0]))
  .map(el => el.getAttribute('aria-label'))
  .filter(label => !!label);
"#;

/// Derive the color name from a label line such as `"Farbe: 09 BLACK"`.
///
/// The prefix and the color code that follows it are dropped; the remaining
/// words form the color. `None` when nothing remains.
pub fn parse_color_line(text: &str, prefix: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(prefix)?;
    let color = rest.split_whitespace().skip(1).collect::<Vec<_>>().join(" ");
    (!color.is_empty()).then_some(color)
}

/// Parse a size option label such as `"M (in stock)"`.
///
/// The size is the text before the first `(`. Options whose status mentions
/// "unavailable" (any case) are excluded, as are empty sizes.
pub fn parse_size_label(label: &str) -> Option<String> {
    let (size, status) = match label.split_once('(') {
        Some((size, status)) => (size, status),
        None => (label, ""),
    };
    if status.to_lowercase().contains("unavailable") {
        return None;
    }
    let size = size.trim();
    (!size.is_empty()).then(|| size.to_string())
}

/// Reads the color label and available sizes from a variant page.
#[derive(Debug, Clone)]
pub struct VariantScraper {
    enrichment: EnrichmentConfig,
    consent: ConsentConfig,
}

impl VariantScraper {
    pub fn new(enrichment: EnrichmentConfig, consent: ConsentConfig) -> Self {
        Self {
            enrichment,
            consent,
        }
    }

    /// Visit `url` in `page` and read its color and sizes.
    ///
    /// A page whose size picker never appears is an error; a page without a
    /// color line yields `color: None`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn scrape<P: Page>(&self, page: &mut P, url: &str) -> Result<VariantResult> {
        page.goto(url, self.enrichment.navigation_timeout()).await?;

        match dismiss_consent(page, &self.consent).await {
            Ok(outcome) => debug!(?outcome, "consent overlay"),
            Err(e) => debug!(error = %e, "consent dismissal failed, continuing"),
        }

        let prefix = &self.enrichment.color_label_prefix;
        let line = page
            .evaluate(COLOR_LINE_SCRIPT, &[Value::String(prefix.clone())])
            .await?;
        let color = line.as_str().and_then(|text| parse_color_line(text, prefix));

        let selector = &self.enrichment.size_picker_selector;
        page.wait_for_selector(selector, self.enrichment.size_picker_timeout())
            .await?;
        let labels = page
            .evaluate(SIZE_LABELS_SCRIPT, &[Value::String(selector.clone())])
            .await?;
        let labels = labels.as_array().ok_or_else(|| {
            RackscanError::parse(format!("size labels were not a list: {labels}"))
        })?;

        let sizes: Vec<String> = labels
            .iter()
            .filter_map(Value::as_str)
            .filter_map(parse_size_label)
            .collect();

        debug!(color = ?color, sizes = sizes.len(), "variant scraped");
        Ok(VariantResult { color, sizes })
    }
}
