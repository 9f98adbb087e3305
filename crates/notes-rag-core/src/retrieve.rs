//! Two-stage retrieve-and-rerank pipeline.
//!
//! # Algorithm
//!
//! 1. Embed the query.
//! 2. Stage 1: fetch `candidate_pool_size` nearest records from the
//!    [`VectorIndex`]. No candidates → return empty, reranker untouched.
//! 3. Convert each distance to a diagnostic similarity `1 − distance`.
//! 4. Stage 2: score every `(query, candidate)` pair with one batched
//!    [`Reranker`] call, in stage-1 order.
//! 5. Stable sort by reranker score, descending. Ties keep stage-1 order.
//! 6. Truncate to `top_n`.
//!
//! The [`Retriever`] holds long-lived collaborators and no per-query
//! state, so one instance can serve concurrent queries.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::embedding::{distance_to_similarity, Embedder};
use crate::error::RetrievalError;
use crate::models::{Candidate, ScoredResult};
use crate::rerank::Reranker;
use crate::store::VectorIndex;

/// Pool and result sizes, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalParams {
    /// Number of stage-1 candidates handed to the reranker.
    pub candidate_pool_size: usize,
    /// Default number of final results.
    pub top_n: usize,
}

impl RetrievalParams {
    pub fn new(candidate_pool_size: usize, top_n: usize) -> Result<Self, RetrievalError> {
        let params = Self {
            candidate_pool_size,
            top_n,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.top_n == 0 {
            return Err(RetrievalError::InvalidParams(
                "top_n must be >= 1".to_string(),
            ));
        }
        if self.candidate_pool_size < self.top_n {
            return Err(RetrievalError::InvalidParams(format!(
                "candidate_pool_size ({}) must be >= top_n ({})",
                self.candidate_pool_size, self.top_n
            )));
        }
        Ok(())
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            candidate_pool_size: 10,
            top_n: 3,
        }
    }
}

/// Retrieval pipeline over injected collaborators.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<dyn Reranker>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
        params: RetrievalParams,
    ) -> Result<Self, RetrievalError> {
        params.validate()?;
        Ok(Self {
            embedder,
            index,
            reranker,
            params,
        })
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Embed `query` and return up to `k` stage-1 candidates, nearest first.
    pub async fn retrieve_candidates(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        let started = Instant::now();
        let embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(RetrievalError::Embedding)?;
        debug!(
            model = self.embedder.model_name(),
            dims = embedding.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedded query"
        );

        let started = Instant::now();
        let neighbors = self
            .index
            .query_similar(&embedding, k)
            .await
            .map_err(RetrievalError::VectorSearch)?;
        debug!(
            collection = %self.index.collection().name,
            requested = k,
            returned = neighbors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage 1 complete"
        );

        Ok(neighbors
            .into_iter()
            .map(|n| Candidate {
                similarity: distance_to_similarity(n.distance),
                distance: n.distance,
                content: n.content,
            })
            .collect())
    }

    /// Retrieve with the configured `top_n`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>, RetrievalError> {
        self.retrieve_and_rerank(query, self.params.top_n).await
    }

    /// Full two-stage retrieval. At most `top_n` results, sorted by
    /// descending reranker score.
    pub async fn retrieve_and_rerank(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<ScoredResult>, RetrievalError> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        if top_n > self.params.candidate_pool_size {
            warn!(
                top_n,
                candidate_pool_size = self.params.candidate_pool_size,
                "top_n exceeds the candidate pool; at most the pool size is returned"
            );
        }

        let candidates = self
            .retrieve_candidates(query, self.params.candidate_pool_size)
            .await?;
        if candidates.is_empty() {
            debug!("no stage 1 candidates; skipping rerank");
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let started = Instant::now();
        let scores = self
            .reranker
            .score(query, &texts)
            .await
            .map_err(RetrievalError::Rerank)?;
        if scores.len() != candidates.len() {
            return Err(RetrievalError::ScoreCountMismatch {
                expected: candidates.len(),
                actual: scores.len(),
            });
        }
        debug!(
            model = self.reranker.model_name(),
            pairs = texts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage 2 complete"
        );

        let mut results: Vec<ScoredResult> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(rank, (candidate, score))| ScoredResult {
                content: candidate.content,
                score,
                similarity: candidate.similarity,
                stage1_rank: rank,
            })
            .collect();

        rank_by_score(&mut results);
        results.truncate(top_n);
        Ok(results)
    }
}

/// Stable descending sort by score. NaN scores go last.
pub fn rank_by_score(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| descending(a.score, b.score));
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.total_cmp(&a),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DistanceMetric;
    use crate::store::memory::InMemoryIndex;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    /// Maps each known text to a fixed vector; unknown text → `[1, 0]`.
    struct FixedEmbedder {
        table: Vec<(String, Vec<f32>)>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.table
                        .iter()
                        .find(|(k, _)| k == t)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| vec![1.0, 0.0])
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("connection refused")
        }
    }

    /// Scores each candidate by looking up its text; records every call.
    struct ScriptedReranker {
        scores: Vec<(String, f32)>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedReranker {
        fn new(scores: &[(&str, f32)]) -> Self {
            Self {
                scores: scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Reranker for ScriptedReranker {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn score(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.seen.lock().unwrap().push(candidates.to_vec());
            Ok(candidates
                .iter()
                .map(|c| {
                    self.scores
                        .iter()
                        .find(|(t, _)| t == c)
                        .map(|(_, s)| *s)
                        .unwrap_or(0.0)
                })
                .collect())
        }
    }

    struct ShortReranker;

    #[async_trait]
    impl Reranker for ShortReranker {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn score(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>> {
            Ok(vec![1.0; candidates.len().saturating_sub(1)])
        }
    }

    /// Ten records at increasing angles from `[1, 0]`, so stage-1 order is c0..c9.
    fn fan_index() -> InMemoryIndex {
        let records: Vec<(String, String, Vec<f32>)> = (0..10)
            .map(|i| {
                let angle = i as f32 * 0.15;
                (i.to_string(), format!("c{}", i), vec![angle.cos(), angle.sin()])
            })
            .collect();
        InMemoryIndex::from_records("fan", DistanceMetric::Cosine, records)
    }

    fn retriever(
        index: InMemoryIndex,
        reranker: Arc<ScriptedReranker>,
        params: RetrievalParams,
    ) -> Retriever {
        let embedder = Arc::new(FixedEmbedder { table: Vec::new() });
        Retriever::new(embedder, Arc::new(index), reranker, params).unwrap()
    }

    #[tokio::test]
    async fn test_top_two_of_ten_by_reranker_score() {
        let reranker = Arc::new(ScriptedReranker::new(&[
            ("c0", 0.2),
            ("c1", 0.9),
            ("c2", 0.5),
            ("c3", -1.0),
            ("c7", 0.95),
        ]));
        let r = retriever(fan_index(), reranker.clone(), RetrievalParams::new(10, 3).unwrap());

        let results = r.retrieve_and_rerank("q", 2).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|x| x.content.as_str()).collect();
        assert_eq!(contents, vec!["c7", "c1"]);
        assert_eq!(results[0].stage1_rank, 7);
        assert_eq!(reranker.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reranker_sees_stage1_order_in_one_batch() {
        let reranker = Arc::new(ScriptedReranker::new(&[]));
        let r = retriever(fan_index(), reranker.clone(), RetrievalParams::new(4, 2).unwrap());
        r.retrieve("q").await.unwrap();

        let seen = reranker.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec!["c0", "c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_ties_keep_stage1_order() {
        let reranker = Arc::new(ScriptedReranker::new(&[
            ("c0", 0.5),
            ("c1", 0.7),
            ("c2", 0.5),
            ("c3", 0.7),
        ]));
        let r = retriever(fan_index(), reranker, RetrievalParams::new(4, 4).unwrap());
        let results = r.retrieve("q").await.unwrap();
        let contents: Vec<&str> = results.iter().map(|x| x.content.as_str()).collect();
        assert_eq!(contents, vec!["c1", "c3", "c0", "c2"]);
    }

    #[tokio::test]
    async fn test_results_sorted_and_bounded() {
        let reranker = Arc::new(ScriptedReranker::new(&[
            ("c0", 3.0),
            ("c1", -2.0),
            ("c2", 8.5),
            ("c3", 0.0),
            ("c4", 8.5),
            ("c5", 1.0),
        ]));
        let r = retriever(fan_index(), reranker, RetrievalParams::new(10, 3).unwrap());
        for top_n in 1..=12 {
            let results = r.retrieve_and_rerank("q", top_n).await.unwrap();
            assert!(results.len() <= top_n);
            assert!(results.len() <= 10);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_empty_collection_skips_reranker() {
        let reranker = Arc::new(ScriptedReranker::new(&[]));
        let index = InMemoryIndex::new("empty", DistanceMetric::Cosine);
        let r = retriever(index, reranker.clone(), RetrievalParams::default());

        let results = r.retrieve("anything").await.unwrap();
        assert!(results.is_empty());
        assert_eq!(reranker.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_similarity_is_diagnostic_only() {
        // c9 is farthest in vector space but best by reranker.
        let reranker = Arc::new(ScriptedReranker::new(&[("c9", 10.0)]));
        let r = retriever(fan_index(), reranker, RetrievalParams::new(10, 1).unwrap());
        let results = r.retrieve("q").await.unwrap();
        assert_eq!(results[0].content, "c9");
        let candidates = r.retrieve_candidates("q", 10).await.unwrap();
        assert!(results[0].similarity <= candidates[0].similarity);
        assert!((candidates[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_tagged() {
        let r = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(fan_index()),
            Arc::new(ScriptedReranker::new(&[])),
            RetrievalParams::default(),
        )
        .unwrap();
        let err = r.retrieve("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
        assert_eq!(err.stage(), "embed");
        assert!(!err.is_configuration());
    }

    #[tokio::test]
    async fn test_score_count_mismatch() {
        let r = Retriever::new(
            Arc::new(FixedEmbedder { table: Vec::new() }),
            Arc::new(fan_index()),
            Arc::new(ShortReranker),
            RetrievalParams::new(5, 2).unwrap(),
        )
        .unwrap();
        let err = r.retrieve("q").await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::ScoreCountMismatch {
                expected: 5,
                actual: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_query_embedding_drives_stage1() {
        let embedder = Arc::new(FixedEmbedder {
            table: vec![("north?".to_string(), vec![0.0, 1.0])],
        });
        let r = Retriever::new(
            embedder,
            Arc::new(fan_index()),
            Arc::new(ScriptedReranker::new(&[])),
            RetrievalParams::default(),
        )
        .unwrap();
        let candidates = r.retrieve_candidates("north?", 3).await.unwrap();
        assert_eq!(candidates[0].content, "c9");
    }

    #[test]
    fn test_params_validation() {
        assert!(RetrievalParams::new(10, 3).is_ok());
        assert!(RetrievalParams::new(3, 3).is_ok());
        assert!(matches!(
            RetrievalParams::new(2, 3),
            Err(RetrievalError::InvalidParams(_))
        ));
        assert!(RetrievalParams::new(10, 0).is_err());
    }

    #[test]
    fn test_rank_by_score_nan_last() {
        let mk = |c: &str, s: f32| ScoredResult {
            content: c.to_string(),
            score: s,
            similarity: 0.0,
            stage1_rank: 0,
        };
        let mut results = vec![mk("nan", f32::NAN), mk("low", -5.0), mk("high", 2.0)];
        rank_by_score(&mut results);
        let contents: Vec<&str> = results.iter().map(|x| x.content.as_str()).collect();
        assert_eq!(contents, vec!["high", "low", "nan"]);
    }
}
