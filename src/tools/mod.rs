pub mod crawl;
pub mod deep_research;
pub mod report;
pub mod search;

pub use crawl::SiteCrawler;
pub use deep_research::{ResearchOrchestrator, ResearchPhase};
pub use report::pack_report;
