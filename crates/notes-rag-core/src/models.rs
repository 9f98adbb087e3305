//! Data types that flow through the retrieval pipeline.
//!
//! Chunk types produced by the chunker live in [`crate::chunk`]; this
//! module holds the ephemeral per-query records.

use serde::Serialize;

/// A stage-1 hit: chunk text plus its vector-space closeness.
///
/// `similarity` is `1 − distance` and is kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub content: String,
    pub similarity: f64,
    pub distance: f64,
}

/// A stage-2 result, ordered by `score` (reranker relevance, higher is better).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub content: String,
    /// Reranker score. The only value used for ordering.
    pub score: f32,
    /// Stage-1 similarity of the same candidate.
    pub similarity: f64,
    /// Zero-based position of this candidate in the stage-1 list.
    pub stage1_rank: usize,
}
