/// 🔬 Deep Research: multi-engine search + site crawl + relevance packing.
///
/// The orchestrator runs one query through fixed phases:
///  1. `PerEngineSearch`: every configured engine, sequentially, each in its
///     own browser session, with self-healing selectors.
///  2. `CrawlFanOut`: deduplicated result urls crawled concurrently within
///     their origin; each worker scores its pages against the query.
///  3. `Rank`: threshold and stable sort by similarity.
///  4. `Aggregate`: greedy packing into the character budget.
///
/// A per-query budget bounds phases 1 and 2; whatever was gathered when it
/// expires is still ranked. The selector policy is saved after every run.
use crate::{
    antibot::HostThrottle,
    core::{
        config::ResearchConfig,
        error::ResearchError,
        types::{EngineDiagnostic, ResearchOutcome, ResearchRun, Role, ScoredResult},
    },
    features::selector_policy::SelectorPolicy,
    nlp::rerank::RelevanceRanker,
    scraping::{
        fetcher::PageFetcher,
        session::{BrowserLauncher, HttpFetch},
    },
    tools::{crawl::SiteCrawler, report::pack_report, search::EngineSearcher},
};
use futures::stream::{self, StreamExt};
use std::{collections::HashSet, fmt, sync::Arc, time::Duration, time::Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Stages of a research run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchPhase {
    Init,
    PerEngineSearch,
    CrawlFanOut,
    Rank,
    Aggregate,
    Done,
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchPhase::Init => "init",
            ResearchPhase::PerEngineSearch => "per_engine_search",
            ResearchPhase::CrawlFanOut => "crawl_fan_out",
            ResearchPhase::Rank => "rank",
            ResearchPhase::Aggregate => "aggregate",
            ResearchPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// A scored page tagged with (result index, page index) for stable ordering.
type TaggedPage = (usize, usize, ScoredResult);

pub struct ResearchOrchestrator {
    config: ResearchConfig,
    policy: Arc<SelectorPolicy>,
    launcher: Arc<dyn BrowserLauncher>,
    crawler: SiteCrawler,
    ranker: RelevanceRanker,
}

impl ResearchOrchestrator {
    /// Validate `config`, seed `policy` with every engine's selectors and,
    /// when a state path is configured, merge the persisted values.
    pub fn new(
        config: ResearchConfig,
        policy: Arc<SelectorPolicy>,
        http: Arc<dyn HttpFetch>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self, ResearchError> {
        config.validate()?;

        for engine in &config.engines {
            policy.seed(&engine.name, Role::SearchBox, &engine.search_box_selectors);
            policy.seed(&engine.name, Role::ResultList, &engine.result_selectors);
        }
        if let Some(path) = &config.state_path {
            policy.load_state(path);
        }

        let fetcher = Arc::new(PageFetcher::new(
            http,
            Some(Arc::clone(&launcher)),
            config.fetch.clone(),
        ));
        let throttle = Arc::new(HostThrottle::new(Duration::from_millis(
            config.crawl.politeness_delay_ms,
        )));
        let crawler = SiteCrawler::new(fetcher, throttle, &config.crawl.exclude_patterns);

        Ok(Self {
            config,
            policy,
            launcher,
            crawler,
            ranker: RelevanceRanker::new(),
        })
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<SelectorPolicy> {
        &self.policy
    }

    /// Research `query` and return the report or the no-results sentinel.
    pub async fn research(&self, query: &str) -> ResearchOutcome {
        self.research_with_diagnostics(query).await.outcome
    }

    /// Like [`Self::research`], plus per-engine diagnostics and crawl counts.
    pub async fn research_with_diagnostics(&self, query: &str) -> ResearchRun {
        let start = Instant::now();
        let query = query.trim();
        let deadline = tokio::time::Instant::now() + self.config.query_budget();
        let mut budget_exhausted = false;

        enter(ResearchPhase::Init, query);

        // ── Search phase ─────────────────────────────────────────────────
        enter(ResearchPhase::PerEngineSearch, query);
        let mut engines: Vec<EngineDiagnostic> = Vec::new();
        let mut result_urls: Vec<String> = Vec::new();
        let searched =
            tokio::time::timeout_at(deadline, self.search_all(query, &mut engines, &mut result_urls))
                .await;
        if searched.is_err() {
            warn!(
                "⏱️ Query budget of {}s exhausted during search ({} urls so far)",
                self.config.query_budget_secs,
                result_urls.len()
            );
            budget_exhausted = true;
        }

        // ── Crawl phase ──────────────────────────────────────────────────
        enter(ResearchPhase::CrawlFanOut, query);
        let collected: Mutex<Vec<TaggedPage>> = Mutex::new(Vec::new());
        if !budget_exhausted && !result_urls.is_empty() {
            let crawled = tokio::time::timeout_at(
                deadline,
                self.crawl_all(query, &result_urls, &collected),
            )
            .await;
            if crawled.is_err() {
                warn!(
                    "⏱️ Query budget of {}s exhausted during crawl, ranking partial results",
                    self.config.query_budget_secs
                );
                budget_exhausted = true;
            }
        }
        let pages = ordered_unique_pages(collected.into_inner());
        let pages_collected = pages.len();

        // ── Rank phase ───────────────────────────────────────────────────
        enter(ResearchPhase::Rank, query);
        let ranked = self
            .ranker
            .filter_ranked(pages, self.config.similarity_threshold);
        let pages_ranked = ranked.len();

        // ── Aggregate phase ──────────────────────────────────────────────
        enter(ResearchPhase::Aggregate, query);
        let report = pack_report(query, &ranked, self.config.char_budget);
        let outcome = if report.is_empty() {
            ResearchOutcome::NoResults {
                query: query.to_string(),
            }
        } else {
            ResearchOutcome::Report(report)
        };

        self.persist_policy();
        enter(ResearchPhase::Done, query);

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            ResearchOutcome::Report(r) => info!(
                "✅ Research for '{}' done: {} sections, {} chars, {} engines, {} pages, {}ms",
                query,
                r.sections.len(),
                r.total_chars(),
                engines.len(),
                pages_collected,
                duration_ms
            ),
            ResearchOutcome::NoResults { .. } => info!("{} ({}ms)", outcome, duration_ms),
        }

        ResearchRun {
            outcome,
            engines,
            result_urls,
            pages_collected,
            pages_ranked,
            budget_exhausted,
            duration_ms,
        }
    }

    /// Search every engine in order; result urls are deduplicated across
    /// engines, first seen wins.
    async fn search_all(
        &self,
        query: &str,
        diagnostics: &mut Vec<EngineDiagnostic>,
        result_urls: &mut Vec<String>,
    ) {
        let searcher = EngineSearcher::new(
            &self.policy,
            self.launcher.as_ref(),
            self.config.fetch.element_timeout(),
            self.config.fetch.http_timeout(),
            self.config.max_results_per_engine,
        );
        let mut seen: HashSet<String> = result_urls.iter().cloned().collect();

        for engine in &self.config.engines {
            let outcome = searcher.search(engine, query).await;
            for url in outcome.urls {
                if seen.insert(url.clone()) {
                    result_urls.push(url);
                }
            }
            diagnostics.push(outcome.diagnostic);
        }
    }

    /// Crawl every result site on the bounded pool and score its pages as
    /// each crawl finishes.
    async fn crawl_all(
        &self,
        query: &str,
        result_urls: &[String],
        collected: &Mutex<Vec<TaggedPage>>,
    ) {
        let max_pages = self.config.crawl.max_pages_per_site;
        let ranker = self.ranker;
        stream::iter(result_urls.iter().enumerate())
            .map(|(result_idx, url)| async move {
                match self.crawler.crawl(url, max_pages).await {
                    Ok(result) => {
                        let scored: Vec<TaggedPage> = result
                            .pages
                            .into_iter()
                            .enumerate()
                            .map(|(page_idx, page)| {
                                (result_idx, page_idx, ranker.score_page(query, page))
                            })
                            .collect();
                        collected.lock().await.extend(scored);
                    }
                    Err(e) => warn!("Crawl of {} failed: {}", url, e),
                }
            })
            .buffer_unordered(self.config.max_concurrent_crawls)
            .for_each(|_| async {})
            .await;
    }

    fn persist_policy(&self) {
        let Some(path) = &self.config.state_path else {
            return;
        };
        if let Err(e) = self.policy.save_state(path) {
            warn!("Failed to persist selector policy: {}", e);
        }
    }
}

fn enter(phase: ResearchPhase, query: &str) {
    info!("research phase → {} (query: '{}')", phase, query);
}

/// Sort by (result index, page index) and keep the first page per url.
fn ordered_unique_pages(mut tagged: Vec<TaggedPage>) -> Vec<ScoredResult> {
    tagged.sort_by_key(|(result_idx, page_idx, _)| (*result_idx, *page_idx));
    let mut seen = HashSet::new();
    tagged
        .into_iter()
        .filter(|(_, _, page)| seen.insert(page.url.clone()))
        .map(|(_, _, page)| page)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> ScoredResult {
        ScoredResult {
            url: url.to_string(),
            title: None,
            text: String::new(),
            similarity: 0.5,
        }
    }

    #[test]
    fn pages_are_ordered_independent_of_completion() {
        let tagged = vec![
            (1, 0, page("https://b.test/")),
            (0, 1, page("https://a.test/2")),
            (0, 0, page("https://a.test/")),
            (1, 1, page("https://a.test/2")),
        ];
        let urls: Vec<String> = ordered_unique_pages(tagged)
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(urls, vec!["https://a.test/", "https://a.test/2", "https://b.test/"]);
    }

    #[test]
    fn phase_names() {
        assert_eq!(ResearchPhase::PerEngineSearch.to_string(), "per_engine_search");
        assert_eq!(ResearchPhase::Done.to_string(), "done");
    }
}
