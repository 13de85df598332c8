//! Browser session capability used by the loader and the enrichment crawler.
//!
//! The crawler only ever talks to the [`Browser`] and [`Page`] traits. The
//! shipped implementation, [`WebDriverBrowser`], drives a real browser over the
//! W3C WebDriver HTTP protocol (chromedriver, geckodriver).
//!
//! One `Browser` lives for the whole run; each [`Page`] is an isolated
//! browsing context opened around exactly one visit and closed afterwards.

mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use rackscan_shared::Result;
use serde_json::Value;

pub use webdriver::{WebDriverBrowser, WebDriverPage, session_capabilities};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A live browser session that hands out page contexts.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Page context type produced by this session.
    type Page: Page;

    /// Open a fresh page context with the session's viewport applied.
    async fn open_page(&self) -> Result<Self::Page>;

    /// End the session. Pages must be closed first.
    async fn quit(&self) -> Result<()> {
        Ok(())
    }
}

/// One browsing context.
///
/// Every method is a suspension point and may fail; callers decide which
/// failures are fatal.
#[async_trait]
pub trait Page: Send {
    /// Navigate and wait for the document to finish loading, bounded by `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Run `script` as a function body in the page. `args` are exposed as
    /// `arguments[i]`; the function's `return` value is the result.
    async fn evaluate(&mut self, script: &str, args: &[Value]) -> Result<Value>;

    /// Wait until `selector` matches at least one element.
    /// Fails with a timeout error once `timeout` has elapsed.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<()>;

    /// Serialized DOM of the current document.
    async fn content(&mut self) -> Result<String>;

    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<()>;

    /// Release the context. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}
