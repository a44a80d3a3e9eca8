use crate::antibot::HostThrottle;
use crate::core::error::ResearchError;
use crate::core::types::CrawlResult;
use crate::scraping::fetcher::PageFetcher;
use aho_corasick::AhoCorasick;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Breadth-first crawler confined to the seed's origin.
///
/// Every url is fetched at most once per crawl and the visit count never
/// exceeds `max_pages`. Links to other origins still become edges in the
/// link graph but are not followed.
pub struct SiteCrawler {
    fetcher: Arc<PageFetcher>,
    throttle: Arc<HostThrottle>,
    exclude: Option<AhoCorasick>,
}

impl SiteCrawler {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        throttle: Arc<HostThrottle>,
        exclude_patterns: &[String],
    ) -> Self {
        let exclude = if exclude_patterns.is_empty() {
            None
        } else {
            match AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(exclude_patterns)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    warn!("Invalid crawl exclude patterns, excluding nothing: {}", e);
                    None
                }
            }
        };
        Self {
            fetcher,
            throttle,
            exclude,
        }
    }

    pub async fn crawl(&self, seed_url: &str, max_pages: usize) -> Result<CrawlResult, ResearchError> {
        let start_time = Instant::now();
        let seed = parse_http_url(seed_url)?;
        let origin = seed.origin();

        info!("Starting crawl of {} (max_pages: {})", seed_url, max_pages);

        let mut result = CrawlResult {
            seed_url: seed_url.to_string(),
            ..Default::default()
        };
        let mut visited_keys: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([seed.to_string()]);

        while let Some(url) = queue.pop_front() {
            if result.visited.len() >= max_pages {
                debug!("Reached max_pages limit: {}", max_pages);
                break;
            }
            if !visited_keys.insert(normalize_url(&url)) {
                continue;
            }
            result.visited.push(url.clone());
            result.link_graph.entry(url.clone()).or_default();

            if let Some(host) = Url::parse(&url).ok().and_then(|u| u.host_str().map(str::to_string)) {
                self.throttle.wait(&host).await;
            }

            let Some(fetched) = self.fetcher.fetch(&url).await else {
                warn!("Failed to crawl {}", url);
                result.failed.push(url);
                continue;
            };

            for link in &fetched.links {
                result
                    .link_graph
                    .entry(url.clone())
                    .or_default()
                    .insert(link.clone());

                if !self.should_crawl(link, &origin) {
                    continue;
                }
                if !visited_keys.contains(&normalize_url(link)) {
                    queue.push_back(link.clone());
                }
            }
            result.pages.push(fetched.page);
        }

        result.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Crawl of {} completed: {} visited, {} failed, {}ms total",
            seed_url,
            result.visited.len(),
            result.failed.len(),
            result.duration_ms
        );
        Ok(result)
    }

    /// Same origin (scheme, host, port) and not matching an exclude pattern.
    fn should_crawl(&self, url: &str, origin: &url::Origin) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if &parsed.origin() != origin {
            return false;
        }
        match &self.exclude {
            Some(ac) => !ac.is_match(url),
            None => true,
        }
    }
}

fn parse_http_url(url: &str) -> Result<Url, ResearchError> {
    let parsed = Url::parse(url).map_err(|e| ResearchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ResearchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(parsed)
}

/// Normalize URL for deduplication (remove fragments, trailing slashes)
fn normalize_url(url: &str) -> String {
    if let Ok(mut parsed) = Url::parse(url) {
        parsed.set_fragment(None);
        let mut result = parsed.to_string();
        // Remove trailing slash for consistency
        if result.ends_with('/') && result.len() > 1 {
            result.pop();
        }
        result
    } else {
        url.to_string()
    }
}
