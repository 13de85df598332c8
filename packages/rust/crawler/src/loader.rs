//! Convergence loader for progressively loading listing pages.
//!
//! The listing gives no "done" signal, so the loader keeps scrolling and
//! measuring the number of loaded tiles until the count stops changing for
//! `max_stable` consecutive measurements, or until `max_iterations` is hit.

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use rackscan_browser::{Browser, Page};
use rackscan_shared::{ConsentConfig, ListingSnapshot, LoaderConfig, RackscanError, Result};

use crate::consent::dismiss_consent;
use crate::observer::CrawlObserver;

pub(crate) const COUNT_ITEMS_SCRIPT: &str =
    "return document.querySelectorAll(arguments[0]).length;";

pub(crate) const SCROLL_TO_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); return null;";

// ---------------------------------------------------------------------------
// Convergence state machine
// ---------------------------------------------------------------------------

/// Where the loader stands after the latest measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    /// The count changed on the last measurement.
    Growing,
    /// The count has been unchanged `streak` times, fewer than required.
    Stabilizing { streak: u32 },
    /// The count held for `max_stable` consecutive measurements.
    Converged,
    /// The iteration cap was reached before the count settled.
    CappedOut,
}

impl ConvergenceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::CappedOut)
    }
}

impl std::fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Growing => f.write_str("growing"),
            Self::Stabilizing { streak } => write!(f, "stabilizing ({streak})"),
            Self::Converged => f.write_str("converged"),
            Self::CappedOut => f.write_str("capped out"),
        }
    }
}

/// Tracks item-count measurements and decides when loading is finished.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    max_stable: u32,
    max_iterations: u32,
    previous: u64,
    streak: u32,
    iterations: u32,
    state: ConvergenceState,
}

impl ConvergenceTracker {
    pub fn new(max_stable: u32, max_iterations: u32) -> Self {
        Self {
            max_stable,
            max_iterations,
            previous: 0,
            streak: 0,
            iterations: 0,
            state: ConvergenceState::Growing,
        }
    }

    /// Feed one measurement. Once a terminal state is reached further
    /// measurements are ignored.
    pub fn observe(&mut self, count: u64) -> ConvergenceState {
        if self.state.is_terminal() {
            return self.state;
        }

        self.iterations += 1;
        if count == self.previous {
            self.streak += 1;
        } else {
            self.streak = 0;
            self.previous = count;
        }

        self.state = if self.streak >= self.max_stable {
            ConvergenceState::Converged
        } else if self.iterations >= self.max_iterations {
            ConvergenceState::CappedOut
        } else if self.streak > 0 {
            ConvergenceState::Stabilizing {
                streak: self.streak,
            }
        } else {
            ConvergenceState::Growing
        };
        self.state
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Most recent distinct count.
    pub fn last_count(&self) -> u64 {
        self.previous
    }
}

// ---------------------------------------------------------------------------
// ListingLoader
// ---------------------------------------------------------------------------

/// How loading ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// `Converged` or `CappedOut`.
    pub state: ConvergenceState,
    pub iterations: u32,
    pub item_count: u64,
}

impl LoadOutcome {
    pub fn converged(&self) -> bool {
        self.state == ConvergenceState::Converged
    }
}

/// A captured listing and how its loading ended.
#[derive(Debug, Clone)]
pub struct LoadedListing {
    pub snapshot: ListingSnapshot,
    pub outcome: LoadOutcome,
}

/// Drives a page against a listing URL until its tile count converges.
#[derive(Debug, Clone)]
pub struct ListingLoader {
    config: LoaderConfig,
    consent: ConsentConfig,
}

impl ListingLoader {
    pub fn new(config: LoaderConfig, consent: ConsentConfig) -> Result<Self> {
        if config.max_stable == 0 || config.max_iterations == 0 {
            return Err(RackscanError::config(
                "loader.max_stable and loader.max_iterations must be at least 1",
            ));
        }
        Ok(Self { config, consent })
    }

    /// Load `listing_url` and capture it once judged stable.
    ///
    /// Failure to open the page or to navigate is returned as an error and
    /// is fatal to the run; there is no retry.
    #[instrument(skip_all, fields(url = %self.config.listing_url))]
    pub async fn load<B, O>(&self, browser: &B, observer: &O) -> Result<LoadedListing>
    where
        B: Browser,
        O: CrawlObserver + ?Sized,
    {
        let mut page = browser.open_page().await?;
        let loaded = self.drive(&mut page, observer).await;
        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close listing page");
        }
        loaded
    }

    async fn drive<P, O>(&self, page: &mut P, observer: &O) -> Result<LoadedListing>
    where
        P: Page,
        O: CrawlObserver + ?Sized,
    {
        let start = Instant::now();
        let url = &self.config.listing_url;

        info!(%url, "navigating to listing");
        page.goto(url, self.config.navigation_timeout())
            .await
            .map_err(|e| match e {
                RackscanError::Navigation { .. } => e,
                other => RackscanError::navigation(url.as_str(), other.to_string()),
            })?;

        match dismiss_consent(page, &self.consent).await {
            Ok(outcome) => debug!(?outcome, "consent overlay"),
            Err(e) => debug!(error = %e, "consent dismissal failed, continuing"),
        }

        let mut tracker =
            ConvergenceTracker::new(self.config.max_stable, self.config.max_iterations);
        loop {
            let count = measure(page, &self.config.item_selector).await?;
            let state = tracker.observe(count);
            observer.listing_measured(tracker.iterations(), count, state);
            debug!(iteration = tracker.iterations(), count, %state, "measured listing");

            if state.is_terminal() {
                break;
            }

            page.evaluate(SCROLL_TO_BOTTOM_SCRIPT, &[]).await?;
            tokio::time::sleep(self.config.settle()).await;
        }

        let html = page.content().await?;
        let outcome = LoadOutcome {
            state: tracker.state(),
            iterations: tracker.iterations(),
            item_count: tracker.last_count(),
        };

        info!(
            state = %outcome.state,
            iterations = outcome.iterations,
            items = outcome.item_count,
            bytes = html.len(),
            duration_ms = start.elapsed().as_millis(),
            "listing captured"
        );

        Ok(LoadedListing {
            snapshot: ListingSnapshot::new(html, Utc::now()),
            outcome,
        })
    }
}

/// Number of elements currently matching `selector`.
async fn measure<P: Page>(page: &mut P, selector: &str) -> Result<u64> {
    let value = page
        .evaluate(COUNT_ITEMS_SCRIPT, &[Value::String(selector.to_string())])
        .await?;
    value
        .as_u64()
        .ok_or_else(|| RackscanError::parse(format!("item count was not a number: {value}")))
}
