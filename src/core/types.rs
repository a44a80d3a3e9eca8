use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which element of a search engine page a selector is meant to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The text input the query is typed into.
    SearchBox,
    /// The anchors (or blocks containing anchors) of the organic results.
    ResultList,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SearchBox => "search_box",
            Role::ResultList => "result_list",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selector known for an `(engine, role)` pair together with its learned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub engine: String,
    pub role: Role,
    pub selector: String,
    pub value: f64,
}

/// Plain text extracted from one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
}

/// An extracted page scored against the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    /// Cosine similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Directed link graph: source url → linked urls.
pub type LinkGraph = BTreeMap<String, BTreeSet<String>>;

/// Result of crawling one site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub seed_url: String,
    pub link_graph: LinkGraph,
    /// Pages in the order they were fetched.
    pub pages: Vec<ExtractedPage>,
    /// Every url taken off the queue, in visit order.
    pub visited: Vec<String>,
    pub failed: Vec<String>,
    pub duration_ms: u64,
}

/// One source-attributed excerpt of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub excerpt: String,
    pub similarity: f64,
}

/// Ordered excerpts whose combined length fits the configured character budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub char_budget: usize,
    pub sections: Vec<ReportSection>,
    pub generated_at: DateTime<Utc>,
}

impl ResearchReport {
    /// Total excerpt characters; never exceeds `char_budget`.
    pub fn total_chars(&self) -> usize {
        self.sections
            .iter()
            .map(|s| s.excerpt.chars().count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Markdown rendering, one heading per source.
    pub fn render(&self) -> String {
        let mut out = format!("# Research: {}\n", self.query);
        for section in &self.sections {
            out.push_str(&format!("\n## Source: {}\n", section.url));
            if let Some(title) = section.title.as_deref().filter(|t| !t.trim().is_empty()) {
                out.push_str(&format!("_{}_ (similarity {:.2})\n", title.trim(), section.similarity));
            } else {
                out.push_str(&format!("_(similarity {:.2})_\n", section.similarity));
            }
            out.push('\n');
            out.push_str(&section.excerpt);
            out.push('\n');
        }
        out
    }
}

/// What a research run hands back to its caller.
#[derive(Debug, Clone)]
pub enum ResearchOutcome {
    Report(ResearchReport),
    /// Nothing passed the relevance threshold.
    NoResults { query: String },
}

impl ResearchOutcome {
    pub fn is_no_results(&self) -> bool {
        matches!(self, ResearchOutcome::NoResults { .. })
    }

    pub fn report(&self) -> Option<&ResearchReport> {
        match self {
            ResearchOutcome::Report(r) => Some(r),
            ResearchOutcome::NoResults { .. } => None,
        }
    }
}

impl fmt::Display for ResearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchOutcome::Report(report) => f.write_str(&report.render()),
            ResearchOutcome::NoResults { query } => {
                write!(f, "no results found for query: {}", query)
            }
        }
    }
}

/// Per-engine bookkeeping of one search attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    pub engine: String,
    pub penalties: usize,
    pub rewards: usize,
    pub discovery_attempts: usize,
    #[serde(default)]
    pub discovered: Vec<String>,
    pub result_urls: usize,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A research outcome plus what happened along the way.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub outcome: ResearchOutcome,
    pub engines: Vec<EngineDiagnostic>,
    /// Deduplicated result urls handed to the crawl fan-out.
    pub result_urls: Vec<String>,
    pub pages_collected: usize,
    pub pages_ranked: usize,
    /// `true` when the per-query budget expired before the run finished.
    pub budget_exhausted: bool,
    pub duration_ms: u64,
}
