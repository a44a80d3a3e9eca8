use crate::core::types::{ReportSection, ResearchReport, ScoredResult};
use chrono::Utc;
use tracing::debug;

/// Greedily pack ranked results into at most `budget` excerpt characters.
///
/// Results are taken in order; a result that does not fit is cut to the
/// remaining budget (by characters) and ends the report.
pub fn pack_report(query: &str, ranked: &[ScoredResult], budget: usize) -> ResearchReport {
    let mut sections = Vec::new();
    let mut remaining = budget;

    for result in ranked {
        if remaining == 0 {
            break;
        }
        let text = result.text.trim();
        if text.is_empty() {
            continue;
        }
        let len = text.chars().count();
        let excerpt = if len <= remaining {
            remaining -= len;
            text.to_string()
        } else {
            let cut: String = text.chars().take(remaining).collect();
            debug!("Truncated {} from {} to {} chars", result.url, len, remaining);
            remaining = 0;
            cut
        };
        sections.push(ReportSection {
            url: result.url.clone(),
            title: result.title.clone(),
            excerpt,
            similarity: result.similarity,
        });
    }

    ResearchReport {
        query: query.to_string(),
        char_budget: budget,
        sections,
        generated_at: Utc::now(),
    }
}
