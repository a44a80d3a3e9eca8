//! Browser-driven search against one engine with self-healing selectors.
//!
//! Each role (search box, result list) is resolved the same way: ask the
//! policy for a selector, try it, and on a miss penalize it, discover
//! structural replacements from the live page, register them all, and retry
//! once with the first one. Selectors whose action worked are rewarded; a
//! selector that locates its element but whose action then fails is a miss.

pub mod discovery;
pub mod engines;

use crate::core::error::{BrowserError, ResearchError};
use crate::core::types::{EngineDiagnostic, Role};
use crate::features::selector_policy::{SelectorPolicy, REWARD_FAILURE, REWARD_SUCCESS};
use crate::scraping::session::{
    within, BrowserLauncher, BrowserSession, ScopedSession, SUBMIT_KEY,
};
use engines::EngineConfig;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub use engines::{builtin_engines, normalize_result_href};

/// Result urls of one engine plus what it cost to get them.
#[derive(Debug, Clone, Default)]
pub struct EngineSearch {
    pub urls: Vec<String>,
    pub diagnostic: EngineDiagnostic,
}

pub struct EngineSearcher<'a> {
    policy: &'a SelectorPolicy,
    launcher: &'a dyn BrowserLauncher,
    element_timeout: Duration,
    page_timeout: Duration,
    max_results: usize,
}

impl<'a> EngineSearcher<'a> {
    /// `element_timeout` bounds waiting for a selector, `page_timeout` every
    /// navigation, submit and HTML read.
    pub fn new(
        policy: &'a SelectorPolicy,
        launcher: &'a dyn BrowserLauncher,
        element_timeout: Duration,
        page_timeout: Duration,
        max_results: usize,
    ) -> Self {
        Self {
            policy,
            launcher,
            element_timeout,
            page_timeout,
            max_results,
        }
    }

    /// Run `query` on `engine` in a fresh browser session.
    ///
    /// Never fails: errors are logged and recorded in the diagnostic, and the
    /// url list is empty.
    pub async fn search(&self, engine: &EngineConfig, query: &str) -> EngineSearch {
        let start = Instant::now();
        let mut diagnostic = EngineDiagnostic {
            engine: engine.name.clone(),
            ..Default::default()
        };

        let urls = match ScopedSession::acquire(self.launcher).await {
            Ok(mut scoped) => {
                let result = self.run(&mut scoped, engine, query, &mut diagnostic).await;
                scoped.release().await;
                result
            }
            Err(e) => Err(ResearchError::from(e)),
        };

        let urls = match urls {
            Ok(urls) => {
                info!("🔎 {}: {} result urls", engine.name, urls.len());
                urls
            }
            Err(e) => {
                warn!("⚠️ Engine {} skipped: {}", engine.name, e);
                diagnostic.error = Some(e.to_string());
                Vec::new()
            }
        };
        diagnostic.result_urls = urls.len();
        diagnostic.duration_ms = start.elapsed().as_millis() as u64;
        EngineSearch { urls, diagnostic }
    }

    async fn run(
        &self,
        scoped: &mut ScopedSession,
        engine: &EngineConfig,
        query: &str,
        diagnostic: &mut EngineDiagnostic,
    ) -> Result<Vec<String>, ResearchError> {
        let page_url = Url::parse(&engine.search_url).map_err(|e| ResearchError::InvalidUrl {
            url: engine.search_url.clone(),
            reason: e.to_string(),
        })?;
        let session = scoped.get()?;
        within(
            self.page_timeout,
            &format!("navigate {}", engine.search_url),
            session.navigate(&engine.search_url),
        )
        .await?;

        self.resolve(session, engine, Role::SearchBox, query, &page_url, diagnostic)
            .await?;
        self.resolve(session, engine, Role::ResultList, query, &page_url, diagnostic)
            .await
    }

    async fn resolve(
        &self,
        session: &mut dyn BrowserSession,
        engine: &EngineConfig,
        role: Role,
        query: &str,
        page_url: &Url,
        diagnostic: &mut EngineDiagnostic,
    ) -> Result<Vec<String>, ResearchError> {
        let name = engine.name.as_str();
        let selector = self.policy.get_selector(name, role)?;

        if let Some(out) = self.attempt(session, role, &selector, query, page_url).await? {
            self.policy.update_value(name, role, &selector, REWARD_SUCCESS);
            diagnostic.rewards += 1;
            return Ok(out);
        }

        warn!("Selector miss for {}/{}: '{}'", name, role, selector);
        self.policy.update_value(name, role, &selector, REWARD_FAILURE);
        diagnostic.penalties += 1;

        diagnostic.discovery_attempts += 1;
        let html = within(self.page_timeout, "read page html", session.html()).await?;
        let found = match role {
            Role::SearchBox => discovery::search_box_candidates(&html),
            Role::ResultList => discovery::result_list_candidates(&html, page_url),
        };
        info!(
            "🧭 Discovery for {}/{}: {} structural candidate(s)",
            name,
            role,
            found.len()
        );
        for candidate in &found {
            if self.policy.discover(name, role, candidate) {
                debug!("Registered discovered selector '{}' for {}/{}", candidate, name, role);
                diagnostic.discovered.push(candidate.clone());
            }
        }

        let miss = || ResearchError::SelectorMiss {
            engine: name.to_string(),
            role,
        };
        let Some(retry_selector) = found.iter().find(|s| **s != selector) else {
            return Err(miss());
        };

        match self
            .attempt(session, role, retry_selector, query, page_url)
            .await?
        {
            Some(out) => {
                info!("✨ Healed {}/{} with '{}'", name, role, retry_selector);
                self.policy
                    .update_value(name, role, retry_selector, REWARD_SUCCESS);
                diagnostic.rewards += 1;
                Ok(out)
            }
            None => {
                self.policy
                    .update_value(name, role, retry_selector, REWARD_FAILURE);
                diagnostic.penalties += 1;
                Err(miss())
            }
        }
    }

    /// Try one selector. `Ok(None)` is a miss: nothing located, or the action
    /// on the located element failed. `Err` means the session itself broke.
    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        role: Role,
        selector: &str,
        query: &str,
        page_url: &Url,
    ) -> Result<Option<Vec<String>>, BrowserError> {
        let located = within(
            self.element_timeout + self.page_timeout,
            "locate",
            session.locate(selector, self.element_timeout),
        )
        .await?;
        let Some(element) = located else {
            return Ok(None);
        };
        match role {
            Role::SearchBox => {
                let typed = within(
                    self.page_timeout,
                    "submit query",
                    session.send_keys(&element, &format!("{}{}", query, SUBMIT_KEY)),
                )
                .await;
                match typed {
                    Ok(()) => Ok(Some(Vec::new())),
                    Err(BrowserError::Closed) => Err(BrowserError::Closed),
                    Err(e) => {
                        debug!("'{}' located but submitting failed: {}", selector, e);
                        Ok(None)
                    }
                }
            }
            Role::ResultList => {
                let html = within(self.page_timeout, "read results html", session.html()).await?;
                let urls = extract_result_urls(&html, selector, page_url, self.max_results);
                if urls.is_empty() {
                    debug!("'{}' matched but yielded no result urls", selector);
                    Ok(None)
                } else {
                    Ok(Some(urls))
                }
            }
        }
    }
}

/// Up to `max` destination urls reached through `selector`, in page order.
pub fn extract_result_urls(html: &str, selector: &str, page_url: &Url, max: usize) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        warn!("Unparseable selector '{}'", selector);
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    urls_in_document(&doc, &sel, page_url, max)
}

/// For each matched element take its own href, else its first descendant
/// link, else the nearest enclosing link.
pub(crate) fn urls_in_document(doc: &Html, sel: &Selector, page_url: &Url, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return out;
    };

    for element in doc.select(sel) {
        if out.len() >= max {
            break;
        }
        let href = own_href(&element)
            .or_else(|| element.select(&anchor_sel).find_map(|a| a.value().attr("href")))
            .or_else(|| {
                element
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find_map(|a| own_href(&a))
            });
        let Some(href) = href else {
            continue;
        };
        if let Some(url) = normalize_result_href(href, page_url) {
            if seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }
    out
}

fn own_href<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    if element.value().name() == "a" {
        element.value().attr("href")
    } else {
        None
    }
}
