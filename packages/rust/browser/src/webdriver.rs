//! W3C WebDriver implementation of the browser capability.
//!
//! Speaks the plain HTTP/JSON protocol to a running driver process. A single
//! WebDriver session is created per run; pages are top-level windows opened
//! with `POST /window/new` and closed with `DELETE /window`, after which the
//! session switches back to its root window.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use rackscan_shared::{BrowserConfig, RackscanError, Result};

use crate::{Browser, Page};

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Pre-W3C (JSON Wire) element key, still sent by some drivers.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Interval between element lookups while waiting for a selector.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Slack on top of the driver's own page-load timeout before we give up locally.
const NAVIGATION_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on any single WebDriver HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

/// Every WebDriver response wraps its payload in `value`.
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

/// Error payload returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct NewWindow {
    handle: String,
}

/// Failure of a single command, before it is mapped into [`RackscanError`].
#[derive(Debug)]
enum CommandError {
    /// The driver answered with a WebDriver error code.
    Protocol { error: String, message: String },
    /// The request never got a well-formed answer.
    Transport(String),
}

impl CommandError {
    fn is(&self, code: &str) -> bool {
        matches!(self, Self::Protocol { error, .. } if error == code)
    }
}

impl From<CommandError> for RackscanError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Protocol { error, message } => {
                RackscanError::Browser(format!("{error}: {message}"))
            }
            CommandError::Transport(msg) => RackscanError::Browser(msg),
        }
    }
}

/// HTTP plumbing shared by the session and its pages.
#[derive(Debug, Clone)]
struct Wire {
    client: Client,
    base: String,
}

impl Wire {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Value, CommandError> {
        let url = format!("{}{path}", self.base);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CommandError::Transport(format!("{method} {url}: {e}")))?;
        let status = response.status();
        let payload: WireResponse = response.json().await.map_err(|e| {
            CommandError::Transport(format!("{method} {url}: invalid response body: {e}"))
        })?;

        if status.is_success() {
            return Ok(payload.value);
        }

        match serde_json::from_value::<WireError>(payload.value) {
            Ok(err) => Err(CommandError::Protocol {
                error: err.error,
                message: err.message,
            }),
            Err(_) => Err(CommandError::Transport(format!("{method} {url}: HTTP {status}"))),
        }
    }
}

/// Session-scoped command helper.
#[derive(Debug, Clone)]
struct SessionWire {
    wire: Wire,
    session_id: String,
}

impl SessionWire {
    async fn get(&self, path: &str) -> std::result::Result<Value, CommandError> {
        self.wire
            .send(Method::GET, &self.path(path), None)
            .await
    }

    async fn post(&self, path: &str, body: Value) -> std::result::Result<Value, CommandError> {
        self.wire
            .send(Method::POST, &self.path(path), Some(body))
            .await
    }

    async fn delete(&self, path: &str) -> std::result::Result<Value, CommandError> {
        self.wire
            .send(Method::DELETE, &self.path(path), None)
            .await
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{suffix}", self.session_id)
    }

    /// First element matching a CSS selector, or `None` when nothing matches.
    async fn find_element(&self, selector: &str) -> Result<Option<String>> {
        let found = self
            .post("/element", json!({ "using": "css selector", "value": selector }))
            .await;

        match found {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .or_else(|| value.get(LEGACY_ELEMENT_KEY))
                .and_then(Value::as_str)
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| {
                    RackscanError::Browser(format!("malformed element reference: {value}"))
                }),
            Err(e) if e.is("no such element") => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn switch_to(&self, handle: &str) -> Result<()> {
        self.post("/window", json!({ "handle": handle })).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Build the `capabilities` object for `POST /session` from the browser config.
pub fn session_capabilities(config: &BrowserConfig) -> Value {
    let window_size = format!("{},{}", config.viewport_width, config.viewport_height);

    let mut always_match = json!({
        "browserName": config.browser_name,
        "pageLoadStrategy": "normal",
    });

    match config.browser_name.as_str() {
        "firefox" => {
            let mut args: Vec<String> = config.extra_args.clone();
            if config.headless {
                args.push("-headless".into());
            }
            always_match["moz:firefoxOptions"] = json!({
                "args": args,
                "prefs": { "general.useragent.override": config.user_agent },
            });
        }
        _ => {
            let mut args: Vec<String> = config.extra_args.clone();
            if config.headless {
                args.push("--headless=new".into());
            }
            args.push(format!("--window-size={window_size}"));
            args.push(format!("--user-agent={}", config.user_agent));
            always_match["goog:chromeOptions"] = json!({ "args": args });
        }
    }

    json!({ "capabilities": { "alwaysMatch": always_match } })
}

// ---------------------------------------------------------------------------
// WebDriverBrowser
// ---------------------------------------------------------------------------

/// A WebDriver session shared across the whole run.
pub struct WebDriverBrowser {
    session: SessionWire,
    root_handle: String,
    viewport: (u32, u32),
}

impl WebDriverBrowser {
    /// Create a WebDriver session. Failure here is fatal to the run.
    #[instrument(
        skip_all,
        fields(webdriver = %config.webdriver_url, browser = %config.browser_name)
    )]
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RackscanError::Browser(format!("failed to build HTTP client: {e}")))?;

        let endpoint = Url::parse(&config.webdriver_url).map_err(|e| {
            RackscanError::config(format!("invalid webdriver_url '{}': {e}", config.webdriver_url))
        })?;
        let wire = Wire {
            client,
            base: endpoint.as_str().trim_end_matches('/').to_string(),
        };

        let created = wire
            .send(Method::POST, "/session", Some(session_capabilities(config)))
            .await
            .map_err(|e| {
                let cause = RackscanError::from(e);
                RackscanError::Browser(format!("could not start session: {cause}"))
            })?;

        let NewSession { session_id } = serde_json::from_value(created).map_err(|e| {
            RackscanError::Browser(format!("unexpected new-session response: {e}"))
        })?;

        let session = SessionWire { wire, session_id };

        let root_handle = session
            .get("/window")
            .await?
            .as_str()
            .map(String::from)
            .ok_or_else(|| RackscanError::Browser("driver returned no window handle".into()))?;

        info!(session_id = %session.session_id, "browser session started");

        Ok(Self {
            session,
            root_handle,
            viewport: (config.viewport_width, config.viewport_height),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Best-effort close of a window the session never switched to.
    ///
    /// `DELETE /window` closes the current window, so nothing is deleted
    /// unless the switch to `handle` succeeds.
    async fn discard_window(&self, handle: &str) {
        if let Err(e) = self.session.switch_to(handle).await {
            warn!(%handle, error = %e, "could not switch to new window, leaving it open");
            return;
        }
        if let Err(e) = self.session.delete("/window").await {
            warn!(%handle, error = ?e, "could not close new window");
        }
        if let Err(e) = self.session.switch_to(&self.root_handle).await {
            warn!(error = %e, "could not switch back to root window");
        }
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    type Page = WebDriverPage;

    async fn open_page(&self) -> Result<WebDriverPage> {
        let created = self.session.post("/window/new", json!({ "type": "tab" })).await?;
        let NewWindow { handle } = serde_json::from_value(created)
            .map_err(|e| RackscanError::Browser(format!("unexpected new-window response: {e}")))?;

        if let Err(e) = self.session.switch_to(&handle).await {
            self.discard_window(&handle).await;
            return Err(e);
        }
        debug!(%handle, "opened page");

        let mut page = WebDriverPage {
            session: self.session.clone(),
            handle,
            root_handle: self.root_handle.clone(),
            closed: false,
        };

        let (width, height) = self.viewport;
        if let Err(e) = page.set_viewport(width, height).await {
            let _ = page.close().await;
            return Err(e);
        }

        Ok(page)
    }

    async fn quit(&self) -> Result<()> {
        self.session.delete("").await?;
        info!(session_id = %self.session.session_id, "browser session ended");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebDriverPage
// ---------------------------------------------------------------------------

/// One top-level window of a [`WebDriverBrowser`] session.
pub struct WebDriverPage {
    session: SessionWire,
    handle: String,
    root_handle: String,
    closed: bool,
}

impl WebDriverPage {
    pub fn handle(&self) -> &str {
        &self.handle
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        Url::parse(url).map_err(|e| RackscanError::navigation(url, format!("invalid URL: {e}")))?;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.session
            .post("/timeouts", json!({ "pageLoad": timeout_ms }))
            .await?;

        let navigation = self.session.post("/url", json!({ "url": url }));
        match tokio::time::timeout(timeout + NAVIGATION_GRACE, navigation).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if e.is("timeout") => Err(RackscanError::timeout(url, timeout_ms)),
            Ok(Err(e)) => Err(RackscanError::navigation(url, RackscanError::from(e).to_string())),
            Err(_) => Err(RackscanError::timeout(url, timeout_ms)),
        }
    }

    async fn evaluate(&mut self, script: &str, args: &[Value]) -> Result<Value> {
        let value = self
            .session
            .post("/execute/sync", json!({ "script": script, "args": args }))
            .await?;
        Ok(value)
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.session.find_element(selector).await?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(RackscanError::timeout(selector, after_ms));
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self
            .session
            .find_element(selector)
            .await?
            .ok_or_else(|| RackscanError::Browser(format!("no element matches {selector}")))?;
        self.session
            .post(&format!("/element/{element}/click"), json!({}))
            .await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        let source = self.session.get("/source").await?;
        source
            .as_str()
            .map(String::from)
            .ok_or_else(|| RackscanError::Browser("page source was not a string".into()))
    }

    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.session
            .post("/window/rect", json!({ "width": width, "height": height }))
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let closed = self.session.delete("/window").await;
        let restored = self.session.switch_to(&self.root_handle).await;
        if let Err(e) = &restored {
            warn!(handle = %self.handle, error = %e, "could not switch back to root window");
        }
        closed?;
        restored?;

        debug!(handle = %self.handle, "closed page");
        Ok(())
    }
}
