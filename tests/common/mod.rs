#![allow(dead_code)]

use async_trait::async_trait;
use research_scout::core::config::{CrawlConfig, FetchConfig, PolicyConfig};
use research_scout::core::types::Role;
use research_scout::search::engines::EngineConfig;
use research_scout::{
    BrowserError, BrowserLauncher, BrowserSession, Element, FetchError, HttpFetch, ResearchConfig,
};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// In-memory web: url → html. Unknown urls are 404s.
#[derive(Default)]
pub struct FakeHttp {
    pages: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Fatal("http_404".into()))
    }
}

/// Scripted browser: `navigate` loads a known page, submitting a query in a
/// located element swaps in the results page. Selectors listed in
/// `not_interactable` locate fine but reject typing.
#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, String>,
    results_html: String,
    not_interactable: HashSet<String>,
    hang_on_navigate: bool,
    pub launches: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub submitted: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowser {
    pub fn new(results_html: &str) -> Self {
        Self {
            results_html: results_html.to_string(),
            ..Default::default()
        }
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn not_interactable(mut self, selector: &str) -> Self {
        self.not_interactable.insert(selector.to_string());
        self
    }

    /// Every navigation stalls forever.
    pub fn hanging(mut self) -> Self {
        self.hang_on_navigate = true;
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            results_html: self.results_html.clone(),
            not_interactable: self.not_interactable.clone(),
            hang_on_navigate: self.hang_on_navigate,
            current: String::new(),
            closes: Arc::clone(&self.closes),
            submitted: Arc::clone(&self.submitted),
        }))
    }
}

struct FakeSession {
    pages: HashMap<String, String>,
    results_html: String,
    not_interactable: HashSet<String>,
    hang_on_navigate: bool,
    current: String,
    closes: Arc<AtomicUsize>,
    submitted: Arc<Mutex<Vec<String>>>,
}

fn matches(html: &str, selector: &str) -> bool {
    let Ok(sel) = Selector::parse(selector) else {
        return false;
    };
    let doc = Html::parse_document(html);
    let found = doc.select(&sel).next().is_some();
    found
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if self.hang_on_navigate {
            std::future::pending::<()>().await;
        }
        self.current = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        Ok(())
    }

    async fn locate(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<Element>, BrowserError> {
        if matches(&self.current, selector) {
            Ok(Some(Element::new(selector)))
        } else {
            Ok(None)
        }
    }

    async fn send_keys(&mut self, element: &Element, text: &str) -> Result<(), BrowserError> {
        if self.not_interactable.contains(&element.selector) {
            return Err(BrowserError::Protocol("element not interactable".into()));
        }
        if let Some(query) = text.strip_suffix('\n') {
            self.submitted.lock().unwrap().push(query.to_string());
            self.current = self.results_html.clone();
        }
        Ok(())
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        Ok(self.current.clone())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub const SEARCH_URL: &str = "https://search.test/";

pub fn engine(search_box: &[&str], results: &[&str]) -> EngineConfig {
    EngineConfig::new("mock", SEARCH_URL, search_box, results)
}

/// Greedy, fast, no persistence unless a path is given.
pub fn test_config(engines: Vec<EngineConfig>) -> ResearchConfig {
    ResearchConfig {
        engines,
        state_path: None,
        char_budget: 400,
        query_budget_secs: 30,
        policy: PolicyConfig {
            epsilon: 0.0,
            ..Default::default()
        },
        fetch: FetchConfig {
            retry_delay_ms: 1,
            element_timeout_secs: 1,
            ..Default::default()
        },
        crawl: CrawlConfig {
            max_pages_per_site: 5,
            politeness_delay_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn temp_state_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!(
            "research-scout-it-{}-{}-{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
        .join("selector_policy.json")
}

pub fn role_values(
    policy: &research_scout::SelectorPolicy,
    role: Role,
) -> Vec<(String, f64)> {
    policy
        .candidates("mock", role)
        .into_iter()
        .map(|c| (c.selector, c.value))
        .collect()
}
