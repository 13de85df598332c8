//! Static HTML report over the scored table.
//!
//! The report has an action-count bar chart, the best deals of the
//! highlighted actions, and a sortable, filterable table of every scored
//! product. Available sizes are joined from the enriched table when it exists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use html_escape::{encode_double_quoted_attribute, encode_text};
use tracing::{debug, info, instrument};

use rackscan_shared::{AppConfig, EnrichedRecord, Result};
use rackscan_table::{read_enriched, read_rows, write_atomic};

use crate::deals::{Action, ScoredRow};

/// Rows shown per highlighted action.
pub const TOP_N: usize = 10;

/// Actions that get a top-deals table, in display order.
pub const HIGHLIGHTED: [Action; 3] = [Action::Super, Action::GoodDeal, Action::CheapButMid];

fn action_color(action: Action) -> &'static str {
    match action {
        Action::Super => "#2ECC71",
        Action::GoodDeal => "#3498DB",
        Action::WaitForSale => "#F1C40F",
        Action::Decent => "#95A5A6",
        Action::CheapButMid => "#E67E22",
        Action::Avoid => "#E74C3C",
        Action::Neutral => "#D0D3D4",
        Action::CheapUpperMid => "#CCCCCC",
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A scored row with the sizes found for it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub scored: ScoredRow,
    pub sizes: Option<String>,
}

/// Attach the `Available Sizes` of finalized enriched rows by product id.
pub fn join_sizes(scored: Vec<ScoredRow>, enriched: &[EnrichedRecord]) -> Vec<ReportRow> {
    let mut sizes: HashMap<&str, &str> = HashMap::new();
    for record in enriched {
        if let Some(summary) = &record.available_sizes {
            sizes
                .entry(record.product_id.trim())
                .or_insert(summary.as_str());
        }
    }
    scored
        .into_iter()
        .map(|row| {
            let found = sizes.get(row.product_id.trim()).map(|s| s.to_string());
            ReportRow { scored: row, sizes: found }
        })
        .collect()
}

/// Count per action present, smallest first; ties keep action order.
pub fn action_counts(rows: &[ReportRow]) -> Vec<(Action, usize)> {
    let mut counts: BTreeMap<Action, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.scored.action).or_insert(0) += 1;
    }
    let mut counts: Vec<(Action, usize)> = counts.into_iter().collect();
    counts.sort_by_key(|&(action, count)| (count, action));
    counts
}

/// Up to `n` rows of `action`, highest discount first, then highest review score.
pub fn top_deals(rows: &[ReportRow], action: Action, n: usize) -> Vec<ReportRow> {
    let mut picked: Vec<ReportRow> = rows
        .iter()
        .filter(|r| r.scored.action == action)
        .cloned()
        .collect();
    picked.sort_by(|a, b| {
        b.scored
            .discount_percent
            .total_cmp(&a.scored.discount_percent)
            .then(b.scored.review_score.total_cmp(&a.scored.review_score))
    });
    picked.truncate(n);
    picked
}

/// `Product Insights (YYYY-MM-DD HH:MM)` from the first parseable capture time.
pub fn report_title(rows: &[ReportRow]) -> String {
    let stamp = rows
        .iter()
        .find_map(|r| DateTime::parse_from_rfc3339(r.scored.fetched_at.trim()).ok());
    match stamp {
        Some(ts) => format!("Product Insights ({})", ts.format("%Y-%m-%d %H:%M")),
        None => "Product Insights".to_string(),
    }
}

/// Everything the rendered page shows.
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    pub counts: Vec<(Action, usize)>,
    pub top: Vec<(Action, Vec<ReportRow>)>,
    pub rows: Vec<ReportRow>,
    /// Whether an enriched table was joined; adds the sizes column.
    pub has_sizes: bool,
}

impl Report {
    pub fn build(rows: Vec<ReportRow>, has_sizes: bool) -> Self {
        let top = HIGHLIGHTED
            .iter()
            .map(|&action| (action, top_deals(&rows, action, TOP_N)))
            .collect();
        Self {
            title: report_title(&rows),
            counts: action_counts(&rows),
            top,
            rows,
            has_sizes,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

const STYLE: &str = "\
body{font-family:sans-serif;margin:2em;color:#222}
table{border-collapse:collapse;margin-bottom:2em;width:100%}
th,td{border:1px solid #ddd;padding:4px 8px;text-align:left;font-size:14px}
th{background:#f4f4f4}
#products th{cursor:pointer}
.bar-row{display:flex;align-items:center;margin:4px 0}
.bar-label{width:12em}
.bar{height:18px;margin-right:8px}
#filter{margin-bottom:1em;padding:4px;width:20em}
";

const SCRIPT: &str = "\
const table = document.getElementById('products');
const body = table.tBodies[0];
document.getElementById('filter').addEventListener('input', e => {
  const q = e.target.value.toLowerCase();
  for (const row of body.rows) {
    row.style.display = row.textContent.toLowerCase().includes(q) ? '' : 'none';
  }
});
table.querySelectorAll('th').forEach((th, col) => {
  let asc = true;
  th.addEventListener('click', () => {
    const key = r => r.cells[col].dataset.sort ?? r.cells[col].textContent;
    const rows = Array.from(body.rows);
    rows.sort((a, b) => {
      const x = key(a), y = key(b);
      const nx = parseFloat(x), ny = parseFloat(y);
      const c = !isNaN(nx) && !isNaN(ny) ? nx - ny : x.localeCompare(y);
      return asc ? c : -c;
    });
    asc = !asc;
    rows.forEach(r => body.appendChild(r));
  });
});
";

fn header_row(has_sizes: bool) -> String {
    let mut cells = vec![
        "Product ID",
        "Name",
        "Promo Price",
        "Rating",
        "Reviews",
        "Discount %",
        "Action",
    ];
    if has_sizes {
        cells.push("Available Sizes");
    }
    let cells: String = cells.iter().map(|c| format!("<th>{c}</th>")).collect();
    format!("<tr>{cells}</tr>\n")
}

fn name_cell(row: &ScoredRow, linked: bool) -> String {
    let name = encode_text(&row.name);
    let url = row.product_url.trim();
    if linked && (url.starts_with("https://") || url.starts_with("http://")) {
        format!(
            "<td><a href=\"{}\" target=\"_blank\">{name}</a></td>",
            encode_double_quoted_attribute(url)
        )
    } else {
        format!("<td>{name}</td>")
    }
}

fn product_row(row: &ReportRow, has_sizes: bool, linked: bool) -> String {
    let s = &row.scored;
    let mut out = String::from("<tr>");
    out.push_str(&format!("<td>{}</td>", encode_text(&s.product_id)));
    out.push_str(&name_cell(s, linked));
    out.push_str(&format!("<td data-sort=\"{0}\">{0:.2}</td>", s.promo_price));
    out.push_str(&format!("<td>{}</td>", s.rating));
    out.push_str(&format!("<td>{}</td>", s.reviews));
    out.push_str(&format!("<td data-sort=\"{0}\">{0:.2}</td>", s.discount_percent));
    out.push_str(&format!("<td>{}</td>", s.action));
    if has_sizes {
        let sizes = row.sizes.as_deref().unwrap_or_default();
        out.push_str(&format!("<td>{}</td>", encode_text(sizes)));
    }
    out.push_str("</tr>\n");
    out
}

fn bar_chart(counts: &[(Action, usize)]) -> String {
    let max = counts.iter().map(|&(_, c)| c).max().unwrap_or(0).max(1);
    let mut out = String::from("<h2>Products per action</h2>\n<div class=\"chart\">\n");
    for &(action, count) in counts {
        let width = count as f64 / max as f64 * 60.0;
        out.push_str(&format!(
            "<div class=\"bar-row\"><span class=\"bar-label\">{action}</span>\
             <span class=\"bar\" style=\"width:{width:.1}%;background:{}\"></span>\
             <span>{count}</span></div>\n",
            action_color(action)
        ));
    }
    out.push_str("</div>\n");
    out
}

/// Render the report as a standalone HTML page.
pub fn render_html(report: &Report) -> String {
    let title = encode_text(&report.title);
    let mut out = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{title}</title>\n<style>\n{STYLE}</style>\n"));
    out.push_str(&format!("</head>\n<body>\n<h1>{title}</h1>\n"));

    out.push_str(&bar_chart(&report.counts));

    for (action, rows) in &report.top {
        out.push_str(&format!("<h2>Top {TOP_N}: {action}</h2>\n"));
        if rows.is_empty() {
            out.push_str("<p>No products.</p>\n");
            continue;
        }
        out.push_str("<table>\n<thead>");
        out.push_str(&header_row(report.has_sizes));
        out.push_str("</thead>\n<tbody>\n");
        for row in rows {
            out.push_str(&product_row(row, report.has_sizes, false));
        }
        out.push_str("</tbody>\n</table>\n");
    }

    out.push_str("<h2>All products</h2>\n");
    out.push_str("<input id=\"filter\" type=\"search\" placeholder=\"Filter products\">\n");
    out.push_str("<table id=\"products\">\n<thead>");
    out.push_str(&header_row(report.has_sizes));
    out.push_str("</thead>\n<tbody>\n");
    for row in &report.rows {
        out.push_str(&product_row(row, report.has_sizes, true));
    }
    out.push_str("</tbody>\n</table>\n");
    out.push_str(&format!("<script>\n{SCRIPT}</script>\n</body>\n</html>\n"));
    out
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// File locations used by [`run_report`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub scored: PathBuf,
    /// Enriched table to take sizes from; skipped when absent on disk.
    pub enriched: Option<PathBuf>,
    pub output: PathBuf,
}

impl From<&AppConfig> for ReportPaths {
    fn from(config: &AppConfig) -> Self {
        Self {
            scored: config.paths.scored(),
            enriched: Some(config.paths.enriched()),
            output: config.paths.report(),
        }
    }
}

/// Summary of a report run.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub rows: usize,
    /// Rows that received sizes from the enriched table.
    pub sized: usize,
    pub has_sizes: bool,
    pub top: Vec<(Action, usize)>,
}

fn load_enriched(path: Option<&Path>) -> Result<Option<Vec<EnrichedRecord>>> {
    match path {
        Some(path) if path.exists() => read_enriched(path).map(Some),
        Some(path) => {
            debug!(path = %path.display(), "no enriched table, report without sizes");
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Read the scored table and write the HTML report.
#[instrument(skip_all, fields(input = %paths.scored.display()))]
pub fn run_report(paths: &ReportPaths) -> Result<ReportSummary> {
    let scored: Vec<ScoredRow> = read_rows(&paths.scored)?;
    let enriched = load_enriched(paths.enriched.as_deref())?;
    let has_sizes = enriched.is_some();
    let rows = join_sizes(scored, enriched.as_deref().unwrap_or_default());

    let report = Report::build(rows, has_sizes);
    write_atomic(&paths.output, render_html(&report).as_bytes())?;

    let summary = ReportSummary {
        path: paths.output.clone(),
        rows: report.rows.len(),
        sized: report.rows.iter().filter(|r| r.sizes.is_some()).count(),
        has_sizes,
        top: report.top.iter().map(|(a, rows)| (*a, rows.len())).collect(),
    };
    info!(
        path = %summary.path.display(),
        rows = summary.rows,
        sized = summary.sized,
        "report written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use rackscan_shared::EnrichmentSummary;
    use rackscan_table::{write_enriched, write_rows};

    fn scored(id: &str, action: Action, discount: f64, review_score: f64) -> ScoredRow {
        ScoredRow {
            product_id: id.into(),
            name: format!("Item {id}"),
            promo_price_text: "9,90 €".into(),
            original_price_text: "19,90 €".into(),
            rating: 4.5,
            reviews: 12,
            product_url: format!("https://shop.example.com/products/{id}"),
            variant_urls: String::new(),
            fetched_at: "2025-05-03T14:07:09.123Z".into(),
            promo_price: 9.9,
            original_price: 19.9,
            discount_percent: discount,
            review_score,
            review_score_quantile: 0.5,
            discount_quantile: 0.5,
            action,
        }
    }

    fn rows(scored: Vec<ScoredRow>) -> Vec<ReportRow> {
        join_sizes(scored, &[])
    }

    fn ids(rows: &[ReportRow]) -> Vec<&str> {
        rows.iter().map(|r| r.scored.product_id.as_str()).collect()
    }

    #[test]
    fn top_deals_pick_one_action() {
        let rows = rows(vec![
            scored("S1", Action::Super, 40.0, 5.0),
            scored("G1", Action::GoodDeal, 70.0, 5.0),
            scored("N1", Action::Neutral, 90.0, 9.0),
            scored("S2", Action::Super, 60.0, 3.0),
        ]);
        assert_eq!(ids(&top_deals(&rows, Action::Super, TOP_N)), vec!["S2", "S1"]);
        assert_eq!(ids(&top_deals(&rows, Action::GoodDeal, TOP_N)), vec!["G1"]);
        assert!(top_deals(&rows, Action::CheapButMid, TOP_N).is_empty());
    }

    #[test]
    fn top_deals_break_discount_ties_by_review_score() {
        let rows = rows(vec![
            scored("A", Action::CheapButMid, 50.0, 2.0),
            scored("B", Action::CheapButMid, 50.0, 7.5),
            scored("C", Action::CheapButMid, 65.0, 1.0),
            scored("D", Action::CheapButMid, 50.0, 4.0),
        ]);
        let top = top_deals(&rows, Action::CheapButMid, TOP_N);
        assert_eq!(ids(&top), vec!["C", "B", "D", "A"]);
    }

    #[test]
    fn top_deals_are_capped_at_ten() {
        let rows = rows(
            (0..12)
                .map(|i| scored(&format!("P{i:02}"), Action::Super, i as f64, 1.0))
                .collect(),
        );
        let top = top_deals(&rows, Action::Super, TOP_N);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].scored.product_id, "P11");
        assert_eq!(top[9].scored.product_id, "P02");

        let report = Report::build(rows, false);
        assert_eq!(report.top[0].0, Action::Super);
        assert_eq!(report.top[0].1.len(), 10);
        assert_eq!(report.rows.len(), 12);
    }

    #[test]
    fn counts_are_ascending() {
        let rows = rows(vec![
            scored("A", Action::Neutral, 1.0, 1.0),
            scored("B", Action::Neutral, 1.0, 1.0),
            scored("C", Action::Super, 1.0, 1.0),
            scored("D", Action::Avoid, 1.0, 1.0),
            scored("E", Action::Neutral, 1.0, 1.0),
        ]);
        assert_eq!(
            action_counts(&rows),
            vec![(Action::Super, 1), (Action::Avoid, 1), (Action::Neutral, 3)]
        );
    }

    #[test]
    fn title_uses_first_capture_time() {
        let mut unknown = scored("A", Action::Neutral, 1.0, 1.0);
        unknown.fetched_at = "Unknown".into();
        let known = scored("B", Action::Neutral, 1.0, 1.0);

        assert_eq!(
            report_title(&rows(vec![unknown.clone(), known])),
            "Product Insights (2025-05-03 14:07)"
        );
        assert_eq!(report_title(&rows(vec![unknown])), "Product Insights");
    }

    #[test]
    fn sizes_join_on_finalized_rows() {
        let enriched = |id: &str, sizes: Option<&str>| EnrichedRecord {
            product_id: id.into(),
            name: String::new(),
            promo_price: String::new(),
            original_price: String::new(),
            rating: String::new(),
            review_count: String::new(),
            product_url: String::new(),
            available_sizes: sizes.and_then(EnrichmentSummary::parse),
            fetched_at: String::new(),
        };
        let joined = join_sizes(
            vec![
                scored("A", Action::Super, 1.0, 1.0),
                scored("B", Action::Super, 1.0, 1.0),
                scored("C", Action::Super, 1.0, 1.0),
            ],
            &[enriched(" A ", Some("BLACK: S, M")), enriched("B", None)],
        );
        assert_eq!(joined[0].sizes.as_deref(), Some("BLACK: S, M"));
        assert_eq!(joined[1].sizes, None);
        assert_eq!(joined[2].sizes, None);
    }

    #[test]
    fn html_escapes_and_links_names() {
        let mut row = scored("A", Action::Super, 50.0, 5.0);
        row.name = "Tee <Oversized> & Co".into();
        let mut unsafe_link = scored("B", Action::Neutral, 10.0, 1.0);
        unsafe_link.product_url = "javascript:alert(1)".into();

        let html = render_html(&Report::build(rows(vec![row, unsafe_link]), false));
        assert!(html.contains("<h1>Product Insights (2025-05-03 14:07)</h1>"));
        assert!(html.contains(
            "<a href=\"https://shop.example.com/products/A\" target=\"_blank\">\
             Tee &lt;Oversized&gt; &amp; Co</a>"
        ));
        assert!(!html.contains("javascript:alert"));
        assert!(!html.contains("<th>Available Sizes</th>"));
        assert!(html.contains("<h2>Top 10: SUPER</h2>"));
        assert!(html.contains("<h2>Top 10: CHEAP BUT MID</h2>\n<p>No products.</p>"));
    }

    #[test]
    fn run_writes_report_with_sizes() {
        let dir = std::env::temp_dir().join(format!("rackscan-report-{}", Uuid::now_v7()));
        let paths = ReportPaths {
            scored: dir.join("scored.csv"),
            enriched: Some(dir.join("enriched.csv")),
            output: dir.join("report.html"),
        };
        write_rows(
            &paths.scored,
            &[
                scored("A", Action::Super, 50.0, 5.0),
                scored("B", Action::GoodDeal, 40.0, 4.0),
            ],
        )
        .unwrap();

        // Without an enriched table the sizes column is left out.
        let summary = run_report(&paths).unwrap();
        assert!(!summary.has_sizes);
        assert_eq!(summary.rows, 2);

        let mut record = EnrichedRecord {
            product_id: "A".into(),
            name: "Item A".into(),
            promo_price: "9,90 €".into(),
            original_price: "19,90 €".into(),
            rating: "4.5".into(),
            review_count: "12".into(),
            product_url: "https://shop.example.com/products/A".into(),
            available_sizes: None,
            fetched_at: "2025-05-03T14:07:09.123Z".into(),
        };
        record.available_sizes = EnrichmentSummary::parse("BLACK: S, M");
        write_enriched(paths.enriched.as_ref().unwrap(), &[record]).unwrap();

        let summary = run_report(&paths).unwrap();
        assert!(summary.has_sizes);
        assert_eq!(summary.sized, 1);
        assert_eq!(
            summary.top,
            vec![(Action::Super, 1), (Action::GoodDeal, 1), (Action::CheapButMid, 0)]
        );

        let html = std::fs::read_to_string(&paths.output).unwrap();
        assert!(html.contains("<th>Available Sizes</th>"));
        assert!(html.contains("<td>BLACK: S, M</td>"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
