//! Typed errors for the retrieval pipeline.
//!
//! Collaborator traits return `anyhow::Result`; the pipeline wraps each
//! failure with the stage it came from so callers can tell a
//! misconfiguration (fatal, fix and restart) from a service failure
//! (caller decides whether to retry).

use thiserror::Error;

use crate::embedding::DistanceMetric;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The target collection does not exist.
    #[error("Collection '{name}' not found. Run `rag ingest` first to populate the database.")]
    MissingCollection { name: String },

    /// The collection was built with a different metric than configured.
    #[error(
        "Collection '{name}' uses {stored} distance but {configured} is configured. \
         Re-run `rag ingest --rebuild` to change the metric."
    )]
    DistanceMismatch {
        name: String,
        configured: DistanceMetric,
        stored: DistanceMetric,
    },

    /// Retrieval parameters are inconsistent.
    #[error("invalid retrieval parameters: {0}")]
    InvalidParams(String),

    #[error("embedding the query failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("vector search failed: {0:#}")]
    VectorSearch(anyhow::Error),

    #[error("reranking failed: {0:#}")]
    Rerank(anyhow::Error),

    /// The reranker broke its one-score-per-candidate contract.
    #[error("reranker returned {actual} scores for {expected} candidates")]
    ScoreCountMismatch { expected: usize, actual: usize },
}

impl RetrievalError {
    /// True for errors that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RetrievalError::MissingCollection { .. }
                | RetrievalError::DistanceMismatch { .. }
                | RetrievalError::InvalidParams(_)
        )
    }

    /// Pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            RetrievalError::MissingCollection { .. }
            | RetrievalError::DistanceMismatch { .. }
            | RetrievalError::InvalidParams(_) => "startup",
            RetrievalError::Embedding(_) => "embed",
            RetrievalError::VectorSearch(_) => "stage1",
            RetrievalError::Rerank(_) | RetrievalError::ScoreCountMismatch { .. } => "stage2",
        }
    }
}
