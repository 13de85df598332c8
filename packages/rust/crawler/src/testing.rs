//! Scripted in-memory browser for crawler tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use rackscan_browser::{Browser, Page};
use rackscan_shared::{ConsentConfig, EnrichedRecord, RackscanError, Result};
use rackscan_table::CheckpointSink;

use crate::loader::{COUNT_ITEMS_SCRIPT, SCROLL_TO_BOTTOM_SCRIPT};
use crate::variant::{COLOR_LINE_SCRIPT, SIZE_LABELS_SCRIPT};

/// What a variant URL serves.
#[derive(Debug, Clone)]
pub(crate) struct FakeVariant {
    pub color_line: Option<String>,
    pub size_labels: Vec<String>,
    pub has_size_picker: bool,
}

/// Scripted site behavior.
#[derive(Debug, Default)]
pub(crate) struct Script {
    /// Successive listing counts; the last one repeats once exhausted.
    pub counts: VecDeque<u64>,
    pub html: String,
    pub consent_present: bool,
    /// URLs whose navigation fails.
    pub failing_urls: HashSet<String>,
    /// URLs whose navigation never completes within the bound.
    pub timeout_urls: HashSet<String>,
    pub variants: HashMap<String, FakeVariant>,
}

#[derive(Default)]
struct State {
    last_count: u64,
    scrolls: usize,
    clicks: Vec<String>,
    visits: Vec<String>,
    opened: usize,
    open: usize,
}

type VisitHook = Box<dyn Fn(usize) + Send + Sync>;

struct Inner {
    script: Mutex<Script>,
    state: Mutex<State>,
    on_visit: Mutex<Option<VisitHook>>,
    consent_selector: String,
}

#[derive(Clone)]
pub(crate) struct FakeBrowser {
    inner: Arc<Inner>,
}

impl FakeBrowser {
    pub fn new(script: Script) -> Self {
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(script),
                state: Mutex::new(State::default()),
                on_visit: Mutex::new(None),
                consent_selector: ConsentConfig::default().selector,
            }),
        }
    }

    /// Run `hook` with the 1-based visit number before each navigation.
    pub fn on_visit(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.inner.on_visit.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn clicks(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().clicks.clone()
    }

    pub fn scrolls(&self) -> usize {
        self.inner.state.lock().unwrap().scrolls
    }

    pub fn visits(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().visits.clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.inner.state.lock().unwrap().opened
    }

    /// Pages opened and not yet closed.
    pub fn open_pages(&self) -> usize {
        self.inner.state.lock().unwrap().open
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self) -> Result<FakePage> {
        let mut state = self.inner.state.lock().unwrap();
        state.opened += 1;
        state.open += 1;
        Ok(FakePage {
            inner: Arc::clone(&self.inner),
            url: None,
            closed: false,
        })
    }
}

pub(crate) struct FakePage {
    inner: Arc<Inner>,
    url: Option<String>,
    closed: bool,
}

impl FakePage {
    fn variant(&self) -> Option<FakeVariant> {
        let url = self.url.as_ref()?;
        self.inner.script.lock().unwrap().variants.get(url).cloned()
    }

    fn consent_present(&self) -> bool {
        self.inner.script.lock().unwrap().consent_present
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let visit = {
            let mut state = self.inner.state.lock().unwrap();
            state.visits.push(url.to_string());
            state.visits.len()
        };
        if let Some(hook) = self.inner.on_visit.lock().unwrap().as_ref() {
            hook(visit);
        }

        {
            let script = self.inner.script.lock().unwrap();
            if script.failing_urls.contains(url) {
                return Err(RackscanError::navigation(url, "net::ERR_CONNECTION_RESET"));
            }
            if script.timeout_urls.contains(url) {
                return Err(RackscanError::timeout(url, timeout.as_millis() as u64));
            }
        }
        self.url = Some(url.to_string());
        Ok(())
    }

    async fn evaluate(&mut self, script: &str, _args: &[Value]) -> Result<Value> {
        if script == COUNT_ITEMS_SCRIPT {
            let next = self.inner.script.lock().unwrap().counts.pop_front();
            let mut state = self.inner.state.lock().unwrap();
            if let Some(count) = next {
                state.last_count = count;
            }
            return Ok(json!(state.last_count));
        }
        if script == SCROLL_TO_BOTTOM_SCRIPT {
            self.inner.state.lock().unwrap().scrolls += 1;
            return Ok(Value::Null);
        }
        if script == COLOR_LINE_SCRIPT {
            return Ok(self
                .variant()
                .and_then(|v| v.color_line)
                .map_or(Value::Null, Value::String));
        }
        if script == SIZE_LABELS_SCRIPT {
            let labels = self.variant().map(|v| v.size_labels).unwrap_or_default();
            return Ok(json!(labels));
        }
        Err(RackscanError::Browser(format!("unexpected script: {script}")))
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let present = if selector == self.inner.consent_selector {
            self.consent_present()
        } else {
            self.variant().is_some_and(|v| v.has_size_picker)
        };
        if present {
            Ok(())
        } else {
            Err(RackscanError::timeout(
                format!("selector {selector}"),
                timeout.as_millis() as u64,
            ))
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        if selector == self.inner.consent_selector && self.consent_present() {
            self.inner.state.lock().unwrap().clicks.push(selector.to_string());
            Ok(())
        } else {
            Err(RackscanError::Browser(format!("no element for {selector}")))
        }
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.inner.script.lock().unwrap().html.clone())
    }

    async fn set_viewport(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.inner.state.lock().unwrap().open -= 1;
        }
        Ok(())
    }
}

/// Keeps a copy of every persisted table.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub snapshots: Vec<Vec<EnrichedRecord>>,
}

impl CheckpointSink for RecordingSink {
    fn persist(&mut self, rows: &[EnrichedRecord]) -> Result<()> {
        self.snapshots.push(rows.to_vec());
        Ok(())
    }
}
