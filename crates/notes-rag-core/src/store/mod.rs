//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the boundary between the retrieval
//! pipeline and whatever persists chunk embeddings. A handle always
//! refers to one existing collection; opening a collection that does not
//! exist is the implementation's job to refuse (see
//! [`RetrievalError::MissingCollection`](crate::RetrievalError::MissingCollection)).
//!
//! Implementations must be `Send + Sync` and safe for concurrent reads.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::DistanceMetric;

/// A stored record returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: String,
    pub content: String,
    /// Distance under the collection's metric. Smaller is closer.
    pub distance: f64,
}

/// Collection-level metadata, recorded once at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub distance: DistanceMetric,
    pub embedding_model: String,
    pub dims: usize,
    /// Unix timestamp of creation.
    pub created_at: i64,
}

/// Similarity-searchable store of `(id, content, embedding)` records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection`](VectorIndex::collection) | Metadata of the open collection |
/// | [`upsert`](VectorIndex::upsert) | Insert or replace a record by id |
/// | [`query_similar`](VectorIndex::query_similar) | Top-k nearest records |
/// | [`count`](VectorIndex::count) | Number of stored records |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection(&self) -> &CollectionInfo;

    /// Insert or replace the record with this `id`.
    async fn upsert(&self, id: &str, content: &str, embedding: &[f32]) -> Result<()>;

    /// Up to `k` records ordered by ascending distance.
    ///
    /// `k` larger than the collection returns every record. Equal
    /// distances keep insertion order.
    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    async fn count(&self) -> Result<usize>;
}

/// Sort by ascending distance and keep the first `k`.
///
/// The sort is stable, so callers that pass records in insertion order
/// get insertion order among equal distances. NaN distances sort last.
pub fn nearest(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| match (a.distance.is_nan(), b.distance.is_nan()) {
        (false, false) => a.distance.total_cmp(&b.distance),
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (true, true) => std::cmp::Ordering::Equal,
    });
    neighbors.truncate(k);
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: &str, distance: f64) -> Neighbor {
        Neighbor {
            id: id.to_string(),
            content: id.to_string(),
            distance,
        }
    }

    #[test]
    fn test_nearest_orders_and_truncates() {
        let out = nearest(vec![n("a", 0.5), n("b", 0.1), n("c", 0.3)], 2);
        let ids: Vec<&str> = out.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_nearest_ties_keep_input_order() {
        let out = nearest(vec![n("x", 0.2), n("y", 0.2), n("z", 0.1)], 10);
        let ids: Vec<&str> = out.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_nearest_nan_last() {
        let out = nearest(vec![n("nan", f64::NAN), n("a", 1.5)], 10);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[1].id, "nan");
    }
}
