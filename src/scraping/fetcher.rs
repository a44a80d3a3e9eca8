//! Page fetching with a static fast path and a browser-render fallback.

use super::extract;
use super::session::{within, BrowserLauncher, HttpFetch, ScopedSession};
use crate::core::config::FetchConfig;
use crate::core::error::{BrowserError, FetchError};
use crate::core::types::ExtractedPage;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use moka::future::Cache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

/// An extracted page plus its outgoing absolute links.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub page: ExtractedPage,
    pub links: Vec<String>,
}

pub struct PageFetcher {
    http: Arc<dyn HttpFetch>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    config: FetchConfig,
    cache: Cache<String, FetchedPage>,
    render_limit: Semaphore,
}

impl PageFetcher {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        browser: Option<Arc<dyn BrowserLauncher>>,
        config: FetchConfig,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs.max(1)))
            .build();
        let render_limit = Semaphore::new(config.max_concurrent_renders.max(1));
        Self {
            http,
            browser,
            config,
            cache,
            render_limit,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Readable text of `url`, or `None` when it could not be fetched.
    pub async fn extract(&self, url: &str) -> Option<ExtractedPage> {
        self.fetch(url).await.map(|f| f.page)
    }

    /// Fetch `url` and extract its text and links.
    ///
    /// Static HTML is tried first; pages whose text stays under
    /// `min_content_chars` are rendered in the browser when one is configured.
    pub async fn fetch(&self, url: &str) -> Option<FetchedPage> {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!("Skipping unparseable URL {}: {}", url, e);
                return None;
            }
        };

        if let Some(cached) = self.cache.get(url).await {
            debug!("cache hit: {}", url);
            return Some(cached);
        }

        let html = self.get_with_retry(url).await?;
        let (mut title, mut text) = extract::static_text(&html, &parsed);
        let mut links = extract::extract_links(&html, &parsed);

        if text.chars().count() < self.config.min_content_chars {
            if let Some(launcher) = self.browser.as_deref() {
                info!(
                    "Thin static content for {} ({} chars), rendering in browser",
                    url,
                    text.chars().count()
                );
                if let Some(rendered_html) = self.render(launcher, url).await {
                    let (rendered_title, rendered_text) = extract::rendered_text(&rendered_html);
                    if rendered_text.len() > text.len() {
                        text = rendered_text;
                        title = rendered_title.or(title);
                        let rendered_links = extract::extract_links(&rendered_html, &parsed);
                        if !rendered_links.is_empty() {
                            links = rendered_links;
                        }
                    }
                }
            }
        }

        let fetched = FetchedPage {
            page: ExtractedPage {
                url: url.to_string(),
                title,
                text,
            },
            links,
        };
        self.cache.insert(url.to_string(), fetched.clone()).await;
        Some(fetched)
    }

    /// GET with a fixed retry delay; only transient failures are retried.
    async fn get_with_retry(&self, url: &str) -> Option<String> {
        let max_attempts = self.config.retries.max(1);
        let delay = self.config.retry_delay();
        let timeout = self.config.http_timeout();
        let attempts = AtomicUsize::new(0);
        let http = &self.http;
        let attempts_ref = &attempts;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(delay)
            .with_max_interval(delay)
            .with_multiplier(1.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        let result = retry(policy, || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = match tokio::time::timeout(timeout, http.get(url)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Transient(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                ))),
            };
            match outcome {
                Ok(body) => Ok(body),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!("Attempt {}/{} for {} failed: {}", attempt, max_attempts, url, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        match result {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(
                    "Fetch failed for {} after {} attempt(s): {}",
                    url,
                    attempts.load(Ordering::SeqCst),
                    e
                );
                None
            }
        }
    }

    async fn render(&self, launcher: &dyn BrowserLauncher, url: &str) -> Option<String> {
        let _permit = self.render_limit.acquire().await.ok()?;
        let mut scoped = match ScopedSession::acquire(launcher).await {
            Ok(s) => s,
            Err(e) => {
                warn!("Browser unavailable for {}: {}", url, e);
                return None;
            }
        };
        let result = render_in(
            &mut scoped,
            url,
            self.config.http_timeout(),
            self.config.element_timeout(),
        )
        .await;
        scoped.release().await;
        match result {
            Ok(html) => Some(html),
            Err(e) => {
                warn!("Render failed for {}: {}", url, e);
                None
            }
        }
    }
}

/// Navigation and the HTML read are bounded by `page_timeout`; waiting for
/// `<body>` by `element_timeout`.
async fn render_in(
    scoped: &mut ScopedSession,
    url: &str,
    page_timeout: Duration,
    element_timeout: Duration,
) -> Result<String, BrowserError> {
    let session = scoped.get()?;
    within(page_timeout, &format!("navigate {}", url), session.navigate(url)).await?;
    let body = within(
        element_timeout + page_timeout,
        "locate body",
        session.locate("body", element_timeout),
    )
    .await?;
    if body.is_none() {
        debug!("render: no <body> on {} within {}ms", url, element_timeout.as_millis());
    }
    within(page_timeout, "read rendered html", session.html()).await
}
