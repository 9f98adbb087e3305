//! Pairwise relevance scoring.

use anyhow::Result;
use async_trait::async_trait;

/// Cross-encoder style scorer for `(query, candidate)` pairs.
///
/// `score` must return exactly one score per candidate, in candidate
/// order. Higher means more relevant; no range or sign is implied.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;

    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>>;
}

/// Restore input order from `(input_index, score)` pairs.
///
/// Scoring backends commonly return results sorted by relevance rather
/// than by input position. Returns `None` when an index is out of range,
/// repeated, or missing.
pub fn scores_in_input_order(
    indexed: impl IntoIterator<Item = (usize, f32)>,
    len: usize,
) -> Option<Vec<f32>> {
    let mut slots: Vec<Option<f32>> = vec![None; len];
    for (index, score) in indexed {
        let slot = slots.get_mut(index)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(score);
    }
    slots.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorders_by_index() {
        let out = scores_in_input_order(vec![(2, 0.9), (0, 0.5), (1, 0.1)], 3).unwrap();
        assert_eq!(out, vec![0.5, 0.1, 0.9]);
    }

    #[test]
    fn test_rejects_gaps_duplicates_and_overflow() {
        assert!(scores_in_input_order(vec![(0, 1.0)], 2).is_none());
        assert!(scores_in_input_order(vec![(0, 1.0), (0, 2.0)], 2).is_none());
        assert!(scores_in_input_order(vec![(5, 1.0)], 2).is_none());
    }

    #[test]
    fn test_empty() {
        assert_eq!(scores_in_input_order(Vec::new(), 0), Some(Vec::new()));
    }
}
