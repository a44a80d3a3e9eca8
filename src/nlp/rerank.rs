use crate::core::types::{ExtractedPage, ScoredResult};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Pairwise TF-IDF relevance between a query and a page.
///
/// The vocabulary and document frequencies come from exactly two documents,
/// the query and the text, so a score never depends on what else was
/// crawled. Scores are cosine similarities in `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelevanceRanker;

impl RelevanceRanker {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize text into lowercase words
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 2) // Skip short words and empty strings
            .map(|s| s.to_string())
            .collect()
    }

    /// Cosine similarity of the TF-IDF vectors of `query` and `text`.
    pub fn score(&self, query: &str, text: &str) -> f64 {
        let q_tokens = Self::tokenize(query);
        let t_tokens = Self::tokenize(text);
        if q_tokens.is_empty() || t_tokens.is_empty() {
            return 0.0;
        }

        let q_tf = term_frequencies(&q_tokens);
        let t_tf = term_frequencies(&t_tokens);

        // Smooth idf over the two-document corpus: ln((1 + n) / (1 + df)) + 1
        let n = 2.0_f64;
        let vocabulary: BTreeSet<&str> = q_tf.keys().chain(t_tf.keys()).copied().collect();

        let mut dot = 0.0;
        let mut q_norm = 0.0;
        let mut t_norm = 0.0;
        for term in vocabulary {
            let q = q_tf.get(term).copied().unwrap_or(0.0);
            let t = t_tf.get(term).copied().unwrap_or(0.0);
            let df = (q > 0.0) as u8 as f64 + (t > 0.0) as u8 as f64;
            let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
            let qw = q * idf;
            let tw = t * idf;
            dot += qw * tw;
            q_norm += qw * qw;
            t_norm += tw * tw;
        }

        if q_norm == 0.0 || t_norm == 0.0 {
            return 0.0;
        }
        (dot / (q_norm.sqrt() * t_norm.sqrt())).clamp(0.0, 1.0)
    }

    /// Score one page against `query`.
    pub fn score_page(&self, query: &str, page: ExtractedPage) -> ScoredResult {
        let similarity = self.score(query, &page.text);
        ScoredResult {
            url: page.url,
            title: page.title,
            text: page.text,
            similarity,
        }
    }

    /// Score every page, drop those below `threshold`, sort by descending
    /// similarity. Equal scores keep their input order.
    pub fn rank_and_filter(
        &self,
        query: &str,
        candidates: Vec<ExtractedPage>,
        threshold: f64,
    ) -> Vec<ScoredResult> {
        let scored = candidates
            .into_iter()
            .map(|page| self.score_page(query, page))
            .collect();
        self.filter_ranked(scored, threshold)
    }

    /// Drop already-scored results below `threshold` and sort the rest by
    /// descending similarity (stable).
    pub fn filter_ranked(&self, scored: Vec<ScoredResult>, threshold: f64) -> Vec<ScoredResult> {
        let total = scored.len();
        let mut kept: Vec<ScoredResult> = scored
            .into_iter()
            .filter(|r| r.similarity >= threshold)
            .collect();

        // Sort by score descending
        kept.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });

        info!(
            "Ranked {} pages, {} above threshold {:.2}",
            total,
            kept.len(),
            threshold
        );
        kept
    }
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0.0) += 1.0;
    }
    let len = tokens.len() as f64;
    for v in counts.values_mut() {
        *v /= len;
    }
    counts
}
