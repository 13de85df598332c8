//! Best-effort dismissal of the cookie-consent overlay.

use rackscan_browser::Page;
use rackscan_shared::{ConsentConfig, Result};

/// What happened to the consent overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// The accept button was found and clicked.
    Dismissed,
    /// No overlay appeared within the configured wait.
    NotPresent,
}

/// Wait (bounded) for the overlay's accept button and click it.
///
/// An absent overlay is `Ok(NotPresent)`, not an error. Any other failure is
/// returned so the caller can log it before discarding it.
pub async fn dismiss_consent<P>(page: &mut P, config: &ConsentConfig) -> Result<ConsentOutcome>
where
    P: Page + ?Sized,
{
    match page.wait_for_selector(&config.selector, config.timeout()).await {
        Ok(()) => {}
        Err(e) if e.is_timeout() => return Ok(ConsentOutcome::NotPresent),
        Err(e) => return Err(e),
    }

    page.click(&config.selector).await?;

    if !config.settle().is_zero() {
        tokio::time::sleep(config.settle()).await;
    }
    Ok(ConsentOutcome::Dismissed)
}
