use crate::core::error::ResearchError;
use crate::tools::search::engines::{self, EngineConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ResearchConfig: file-based config loader (research-scout.json) with env-var overrides
// ---------------------------------------------------------------------------

/// Learning parameters of the selector policy.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Exploration probability of the ε-greedy pick.
    pub epsilon: f64,
    /// Learning rate α of `value ← value + α·(reward − value)`.
    pub learning_rate: f64,
    /// Values and rewards are clamped to `[-value_clamp, value_clamp]`.
    pub value_clamp: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            learning_rate: 0.1,
            value_clamp: 1.0,
        }
    }
}

/// Page fetching: HTTP fast path, retries, and browser fallback.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub http_timeout_secs: u64,
    /// How long to wait for a rendered element (`body`, search box, result list).
    pub element_timeout_secs: u64,
    /// Total attempts of the HTTP fast path on transient failures.
    pub retries: usize,
    pub retry_delay_ms: u64,
    /// Static text shorter than this triggers the browser-rendering path.
    pub min_content_chars: usize,
    /// Concurrent browser renders allowed across all crawls.
    pub max_concurrent_renders: usize,
    pub cache_ttl_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            element_timeout_secs: 10,
            retries: 3,
            retry_delay_ms: 1000,
            min_content_chars: 50,
            max_concurrent_renders: 2,
            cache_ttl_secs: 60 * 30,
        }
    }
}

impl FetchConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Per-site crawl bounds.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_pages_per_site: usize,
    /// Fixed delay between consecutive fetches to the same host.
    pub politeness_delay_ms: u64,
    /// Substrings that mark a url as non-content (matched case-insensitively).
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages_per_site: 10,
            politeness_delay_ms: 500,
            exclude_patterns: [
                // Common non-content patterns
                "/login", "/logout", "/signup", "/register", "/cart", "/checkout", "/admin",
                ".pdf", ".zip", ".exe", ".dmg", ".tar", ".gz", ".mp4", ".mp3", ".wav", ".avi",
                ".mov", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Top-level config loaded from `research-scout.json`.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ResearchConfig {
    pub engines: Vec<EngineConfig>,
    pub max_results_per_engine: usize,
    /// Maximum total excerpt characters of a report.
    pub char_budget: usize,
    pub similarity_threshold: f64,
    /// Size of the crawl worker pool.
    pub max_concurrent_crawls: usize,
    /// Wall-clock budget of one research call.
    pub query_budget_secs: u64,
    /// Where the selector policy is persisted. `None` = in-memory only.
    pub state_path: Option<PathBuf>,
    pub policy: PolicyConfig,
    pub fetch: FetchConfig,
    pub crawl: CrawlConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            engines: engines::builtin_engines(),
            max_results_per_engine: 10,
            char_budget: 8_000,
            similarity_threshold: 0.1,
            max_concurrent_crawls: 5,
            query_budget_secs: 120,
            state_path: default_state_path(),
            policy: PolicyConfig::default(),
            fetch: FetchConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

impl ResearchConfig {
    pub fn query_budget(&self) -> Duration {
        Duration::from_secs(self.query_budget_secs)
    }

    /// Reject configurations that can never produce a report.
    ///
    /// Runs before any network activity; every failure is a
    /// [`ResearchError::Config`].
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.engines.is_empty() {
            return Err(ResearchError::Config(
                "at least one engine must be configured".into(),
            ));
        }
        for engine in &self.engines {
            engine.validate()?;
        }
        if self.char_budget == 0 {
            return Err(ResearchError::Config(
                "char_budget must be greater than 0".into(),
            ));
        }
        if self.max_results_per_engine == 0 {
            return Err(ResearchError::Config(
                "max_results_per_engine must be greater than 0".into(),
            ));
        }
        if self.crawl.max_pages_per_site == 0 {
            return Err(ResearchError::Config(
                "max_pages_per_site must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_crawls == 0 {
            return Err(ResearchError::Config(
                "max_concurrent_crawls must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.policy.epsilon) {
            return Err(ResearchError::Config("epsilon must lie in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.policy.learning_rate) {
            return Err(ResearchError::Config(
                "learning_rate must lie in [0, 1]".into(),
            ));
        }
        if self.policy.value_clamp.is_nan() || self.policy.value_clamp <= 0.0 {
            return Err(ResearchError::Config(
                "value_clamp must be greater than 0".into(),
            ));
        }
        if self.similarity_threshold.is_nan() {
            return Err(ResearchError::Config(
                "similarity_threshold must be a number".into(),
            ));
        }
        if self.fetch.http_timeout_secs == 0 || self.fetch.element_timeout_secs == 0 {
            return Err(ResearchError::Config(
                "timeouts must be greater than 0".into(),
            ));
        }
        if self.fetch.retries == 0 {
            return Err(ResearchError::Config(
                "retries must be at least 1".into(),
            ));
        }
        if self.fetch.max_concurrent_renders == 0 {
            return Err(ResearchError::Config(
                "max_concurrent_renders must be greater than 0".into(),
            ));
        }
        if self.query_budget_secs == 0 {
            return Err(ResearchError::Config(
                "query_budget_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides on top of file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(list) = std::env::var("SEARCH_ENGINES") {
            let names: Vec<&str> = list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                let selected = engines::by_names(&names);
                if selected.len() != names.len() {
                    tracing::warn!("SEARCH_ENGINES contains unknown engine names: {}", list);
                }
                self.engines = selected;
            }
        }
        if let Some(v) = env_parse("RESEARCH_MAX_RESULTS_PER_ENGINE") {
            self.max_results_per_engine = v;
        }
        if let Some(v) = env_parse("RESEARCH_MAX_PAGES_PER_SITE") {
            self.crawl.max_pages_per_site = v;
        }
        if let Some(v) = env_parse("RESEARCH_CHAR_BUDGET") {
            self.char_budget = v;
        }
        if let Some(v) = env_parse("RESEARCH_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v;
        }
        if let Some(v) = env_parse("RESEARCH_MAX_CONCURRENT_CRAWLS") {
            self.max_concurrent_crawls = v;
        }
        if let Some(v) = env_parse("HTTP_TIMEOUT_SECS") {
            self.fetch.http_timeout_secs = v;
        }
        if let Some(v) = env_parse("RESEARCH_QUERY_BUDGET_SECS") {
            self.query_budget_secs = v;
        }
        if let Ok(p) = std::env::var(ENV_STATE_PATH) {
            let p = p.trim();
            if !p.is_empty() {
                self.state_path = Some(PathBuf::from(p));
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub const ENV_CONFIG_PATH: &str = "RESEARCH_SCOUT_CONFIG";
pub const ENV_STATE_PATH: &str = "RESEARCH_SCOUT_STATE";

/// `~/.research-scout/selector_policy.json`, or `None` without a home directory.
pub fn default_state_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".research-scout").join("selector_policy.json"))
}

/// Parse a config document. Missing fields take their defaults.
pub fn parse_research_config(contents: &str) -> Result<ResearchConfig, ResearchError> {
    serde_json::from_str::<ResearchConfig>(contents)
        .map_err(|e| ResearchError::Config(format!("invalid config document: {}", e)))
}

/// Load `research-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `RESEARCH_SCOUT_CONFIG` env var path
/// 2. `./research-scout.json`
/// 3. `../research-scout.json`
///
/// Missing file → defaults (silent). Parse error → warning, defaults.
/// Environment overrides are applied last in both cases.
pub fn load_research_config() -> ResearchConfig {
    let mut candidates = vec![
        PathBuf::from("research-scout.json"),
        PathBuf::from("../research-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    let mut config = ResearchConfig::default();
    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        match parse_research_config(&contents) {
            Ok(cfg) => {
                tracing::info!("research-scout.json loaded from {}", path.display());
                config = cfg;
            }
            Err(e) => {
                tracing::warn!(
                    "research-scout.json parse error at {}: {}, using defaults",
                    path.display(),
                    e
                );
            }
        }
        break;
    }

    config.apply_env_overrides();
    config
}
