pub mod core;
pub mod features;
pub mod nlp;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::config::{load_research_config, ResearchConfig};
pub use core::error::{BrowserError, FetchError, ResearchError};
pub use core::types;
pub use core::types::*;

// --- Short module paths ---
pub use features::{antibot, selector_policy};
pub use nlp::rerank;
pub use tools::{crawl, deep_research, report, search};

pub use features::selector_policy::SelectorPolicy;
pub use nlp::rerank::RelevanceRanker;
pub use scraping::{
    BrowserLauncher, BrowserSession, ChromeLauncher, Element, HttpFetch, PageFetcher,
    ReqwestFetcher, ScopedSession,
};
pub use tools::{pack_report, ResearchOrchestrator, ResearchPhase, SiteCrawler};
