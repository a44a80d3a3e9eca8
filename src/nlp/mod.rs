pub mod rerank;

pub use rerank::RelevanceRanker;
